//! Sandbox loader: executes compiled bundles inside a `deno_core` runtime.
//!
//! A [`Sandbox`] owns one V8 isolate. Before the first bundle runs it installs
//! the capability globals (`process`, `Buffer`, `global`, `globalThis`), the
//! builtin stubs, the component runtime, the host API shim and the loader, in
//! that order. These live for as long as the sandbox does and are never
//! installed twice.
//!
//! Bundles are CommonJS text. The loader wraps each one in a function taking
//! `(exports, require, module, __filename, __dirname)`, where `require` is the
//! total resolution function from [`resolve`]. A successful load yields a
//! [`JsCommand`] that the lifecycle controller drives through
//! [`CommandEntry`].

mod ops;
mod resolve;
mod storage;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::error::{ExtensionError, ExtensionResult};
use super::manifest::{CommandMode, ExtensionManifest};
use super::session::{CommandEntry, Element, FrameId, HostEffect, Probe};

pub use ops::{sandbox_extension, SandboxHostState, Settlement};
pub use resolve::{
    bundler_externals, resolve, Resolution, BUILTIN_MODULES, BUILTIN_PREFIX, HOST_API_MODULES,
    UI_LIBRARY_MODULES,
};
pub use storage::{LocalStorage, STORAGE_FILE};

/// Platform name reported by `process.platform` and `os.platform()`.
pub const DEFAULT_PLATFORM: &str = "darwin";

/// Upper bound on pumping the event loop after a view interaction.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_millis(2000);

const GLOBALS_JS: &str = include_str!("js/globals.js");
const BUILTINS_JS: &str = include_str!("js/builtins.js");
const REACT_JS: &str = include_str!("js/react.js");
const API_JS: &str = include_str!("js/api.js");
const LOADER_JS: &str = include_str!("js/loader.js");

/// Tunables for a [`Sandbox`].
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    pub platform: String,
    pub settle_timeout: Duration,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }
}

/// Who is running, and what the host API shim should report to them.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub extension_id: String,
    pub command_name: String,
    pub mode: CommandMode,
    pub extension_dir: Option<PathBuf>,
    /// Directory for `LocalStorage`; `None` keeps storage in memory.
    pub support_dir: Option<PathBuf>,
    pub preferences: Map<String, Value>,
}

impl CommandContext {
    pub fn new(extension_id: impl Into<String>, command_name: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            command_name: command_name.into(),
            mode: CommandMode::View,
            extension_dir: None,
            support_dir: None,
            preferences: Map::new(),
        }
    }

    /// Context for a command of an installed extension.
    ///
    /// Preference defaults come from the manifest; an unreadable manifest
    /// leaves them empty.
    pub fn for_extension(extension_dir: &Path, command_name: &str, mode: CommandMode) -> Self {
        let extension_id = extension_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let preferences = ExtensionManifest::load(extension_dir)
            .map(|manifest| manifest.preference_defaults(command_name))
            .unwrap_or_default();

        Self {
            extension_id,
            command_name: command_name.to_string(),
            mode,
            extension_dir: Some(extension_dir.to_path_buf()),
            support_dir: None,
            preferences,
        }
    }

    pub fn with_mode(mut self, mode: CommandMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_support_dir(mut self, support_dir: impl Into<PathBuf>) -> Self {
        self.support_dir = Some(support_dir.into());
        self
    }

    pub fn with_preferences(mut self, preferences: Map<String, Value>) -> Self {
        self.preferences = preferences;
        self
    }

    /// The object served as `environment` by the host API shim.
    pub fn environment(&self) -> Value {
        let path = |p: Option<PathBuf>| p.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();

        json!({
            "extensionName": self.extension_id,
            "commandName": self.command_name,
            "commandMode": self.mode.as_str(),
            "assetsPath": path(self.extension_dir.as_ref().map(|d| d.join("assets"))),
            "supportPath": path(self.support_dir.clone()),
            "isDevelopment": false,
            "launchType": "userInitiated",
            "textSize": "medium",
            "appearance": "dark",
        })
    }

    fn host_state(&self) -> SandboxHostState {
        let mut state = SandboxHostState::new(&self.extension_id, &self.command_name);
        state.environment = self.environment();
        state.preferences = self.preferences.clone();
        state.storage = match &self.support_dir {
            Some(dir) => LocalStorage::open(dir),
            None => LocalStorage::in_memory(),
        };
        state
    }
}

/// One isolated JavaScript runtime.
pub struct Sandbox {
    runtime: JsRuntime,
    options: SandboxOptions,
    globals_installed: bool,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxOptions::default())
    }
}

impl Sandbox {
    pub fn new(options: SandboxOptions) -> Self {
        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![sandbox_extension()],
            ..Default::default()
        });

        // Ops may run before the first load (e.g. a console call during setup).
        runtime
            .op_state()
            .borrow_mut()
            .put(SandboxHostState::new("", ""));

        Self {
            runtime,
            options,
            globals_installed: false,
        }
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.options
    }

    /// Load a bundle, logging and discarding any failure.
    pub fn load(&mut self, bundle_text: &str, ctx: &CommandContext) -> Option<JsCommand<'_>> {
        match self.try_load(bundle_text, ctx) {
            Ok(command) => Some(command),
            Err(e) => {
                tracing::error!(
                    extension = %ctx.extension_id,
                    command = %ctx.command_name,
                    error = %e,
                    "failed to load bundle"
                );
                None
            }
        }
    }

    /// Load a bundle and extract its callable entry point.
    pub fn try_load(&mut self, bundle_text: &str, ctx: &CommandContext) -> ExtensionResult<JsCommand<'_>> {
        self.ensure_globals()?;
        self.runtime.op_state().borrow_mut().put(ctx.host_state());

        let wrapped = format!(
            "__nova.loader.define(function (exports, require, module, __filename, __dirname) {{\n{}\n}})",
            bundle_text
        );

        let reply: LoaderReply = self
            .eval_json("<bundle>", wrapped)
            .map_err(|e| ExtensionError::LoadFailed(e.to_string()))?;

        if !reply.ok {
            return Err(ExtensionError::LoadFailed(reply.error.unwrap_or_default()));
        }

        tracing::debug!(
            extension = %ctx.extension_id,
            command = %ctx.command_name,
            "bundle loaded"
        );

        Ok(JsCommand { sandbox: self })
    }

    /// Install the capability globals and runtime scripts once.
    fn ensure_globals(&mut self) -> ExtensionResult<()> {
        if self.globals_installed {
            return Ok(());
        }

        let config = json!({ "platform": self.options.platform });
        self.execute("<host-config>", format!("globalThis.__novaHostConfig = {};", config))?;

        for (name, source) in [
            ("<globals>", GLOBALS_JS),
            ("<builtins>", BUILTINS_JS),
            ("<react>", REACT_JS),
            ("<api>", API_JS),
            ("<loader>", LOADER_JS),
        ] {
            self.execute(name, source.to_string())?;
        }

        self.globals_installed = true;
        Ok(())
    }

    fn execute(&mut self, name: &'static str, code: String) -> ExtensionResult<v8::Global<v8::Value>> {
        self.runtime
            .execute_script(name, code)
            .map_err(|e| ExtensionError::JavaScript(e.to_string()))
    }

    /// Evaluate a script and return its completion value as a string.
    fn eval_string(&mut self, name: &'static str, code: String) -> ExtensionResult<String> {
        let global = self.execute(name, code)?;
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, global);
        local
            .to_string(scope)
            .map(|s| s.to_rust_string_lossy(scope))
            .ok_or_else(|| ExtensionError::JavaScript("result is not convertible to a string".to_string()))
    }

    /// Evaluate a script whose completion value is a JSON string.
    fn eval_json<T: DeserializeOwned>(&mut self, name: &'static str, code: String) -> ExtensionResult<T> {
        let text = self.eval_string(name, code)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn host_state<R>(&mut self, f: impl FnOnce(&mut SandboxHostState) -> R) -> R {
        let state = self.runtime.op_state();
        let mut state = state.borrow_mut();
        f(state.borrow_mut::<SandboxHostState>())
    }

    /// Drive the event loop until it is idle or the timeout passes.
    async fn pump(&mut self, timeout: Duration) {
        let poll = self.runtime.run_event_loop(PollEventLoopOptions::default());
        match tokio::time::timeout(timeout, poll).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "sandbox event loop failed"),
            Err(_) => tracing::trace!("sandbox still busy after {:?}", timeout),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoaderReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeReply {
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RenderReply {
    ok: bool,
    #[serde(default)]
    tree: Option<Element>,
    #[serde(default)]
    error: Option<String>,
}

/// A loaded entry point living inside a [`Sandbox`].
pub struct JsCommand<'a> {
    sandbox: &'a mut Sandbox,
}

#[async_trait(?Send)]
impl<'a> CommandEntry for JsCommand<'a> {
    fn probe(&mut self) -> Probe {
        let reply: ExtensionResult<ProbeReply> =
            self.sandbox.eval_json("<probe>", "__nova.loader.probe()".to_string());

        match reply {
            Ok(reply) => match reply.kind.as_str() {
                "thenable" => Probe::Thenable,
                "renderable" => Probe::Renderable,
                _ => Probe::Threw(reply.message),
            },
            Err(e) => Probe::Threw(e.to_string()),
        }
    }

    async fn run(&mut self) -> Result<(), String> {
        let settled = self.sandbox.host_state(|state| state.settled.clone());

        self.sandbox
            .execute("<run>", "__nova.loader.run()".to_string())
            .map_err(|e| e.to_string())?;

        let poll = self.sandbox.runtime.run_event_loop(PollEventLoopOptions::default());
        tokio::select! {
            _ = settled.notified() => {}
            result = poll => result.map_err(|e| e.to_string())?,
        }

        match self.sandbox.host_state(|state| state.settlement.take()) {
            Some(Settlement { ok: true, .. }) => Ok(()),
            Some(Settlement { ok: false, message }) => Err(message),
            None => Err("command finished without completing its promise".to_string()),
        }
    }

    fn render(&mut self, frame: Option<FrameId>) -> Result<Element, String> {
        let arg = frame.map_or_else(|| "null".to_string(), |id| id.to_string());
        let reply: RenderReply = self
            .sandbox
            .eval_json("<render>", format!("__nova.loader.renderFrame({})", arg))
            .map_err(|e| e.to_string())?;

        match reply {
            RenderReply { ok: true, tree: Some(tree), .. } => Ok(tree),
            RenderReply { ok: true, tree: None, .. } => Err("view rendered nothing".to_string()),
            RenderReply { error, .. } => Err(error.unwrap_or_else(|| "render failed".to_string())),
        }
    }

    fn dispatch(&mut self, callback: &str, args: &[Value]) -> Result<(), String> {
        let script = format!(
            "__nova.loader.invoke({}, {})",
            Value::String(callback.to_string()),
            Value::Array(args.to_vec())
        );
        let reply: LoaderReply = self
            .sandbox
            .eval_json("<dispatch>", script)
            .map_err(|e| e.to_string())?;

        if reply.ok {
            Ok(())
        } else {
            Err(reply.error.unwrap_or_else(|| "action failed".to_string()))
        }
    }

    async fn settle(&mut self) {
        let timeout = self.sandbox.options.settle_timeout;
        self.sandbox.pump(timeout).await;
    }

    fn drain_effects(&mut self) -> Vec<HostEffect> {
        self.sandbox.host_state(|state| std::mem::take(&mut state.effects))
    }

    fn release(&mut self, frame: FrameId) {
        let script = format!("__nova.loader.dropFrame({})", frame);
        if let Err(e) = self.sandbox.execute("<release>", script) {
            tracing::warn!(frame, error = %e, "failed to release frame");
        }
    }
}
