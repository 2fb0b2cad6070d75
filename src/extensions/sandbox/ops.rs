//! Host functions reachable from sandboxed JavaScript.
//!
//! Every op reads or writes the [`SandboxHostState`] kept in `OpState`. The
//! state is replaced whenever a new bundle is loaded, so ops always act on
//! behalf of the command that is currently loaded.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use deno_core::{op2, Extension, OpState};
use deno_error::JsErrorBox;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Notify;

use crate::extensions::session::HostEffect;

use super::resolve::{resolve, Resolution};
use super::storage::LocalStorage;

/// Final outcome of a no-view run, reported by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settlement {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
}

/// Per-command host state visible to ops.
pub struct SandboxHostState {
    pub extension_id: String,
    pub command: String,
    pub environment: Value,
    pub preferences: Map<String, Value>,
    pub storage: LocalStorage,
    pub clipboard: Option<String>,
    pub effects: Vec<HostEffect>,
    pub settlement: Option<Settlement>,
    pub settled: Rc<Notify>,
}

impl SandboxHostState {
    pub fn new(extension_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            command: command.into(),
            environment: Value::Object(Map::new()),
            preferences: Map::new(),
            storage: LocalStorage::in_memory(),
            clipboard: None,
            effects: Vec::new(),
            settlement: None,
            settled: Rc::new(Notify::new()),
        }
    }
}

fn host(state: &mut OpState) -> &mut SandboxHostState {
    state.borrow_mut::<SandboxHostState>()
}

// ─────────────────────────────────────────────────────────────────────────────
// Module resolution and diagnostics
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve a `require` specifier to a loader tag.
#[op2]
#[string]
fn op_sandbox_resolve(state: &mut OpState, #[string] specifier: String) -> String {
    let resolution = resolve(&specifier);
    if resolution == Resolution::Unknown {
        tracing::warn!(
            extension = %host(state).extension_id,
            module = %specifier,
            "unknown dependency, substituting an empty module"
        );
    }
    resolution.tag()
}

/// Forward `console.*` output to tracing.
#[op2(fast)]
fn op_sandbox_log(state: &mut OpState, #[string] level: String, #[string] message: String) {
    let extension = &host(state).extension_id;
    match level.as_str() {
        "error" => tracing::error!(target: "sandbox", extension = %extension, "{}", message),
        "warn" => tracing::warn!(target: "sandbox", extension = %extension, "{}", message),
        "debug" | "trace" => {
            tracing::debug!(target: "sandbox", extension = %extension, "{}", message)
        }
        _ => tracing::info!(target: "sandbox", extension = %extension, "{}", message),
    }
}

/// Timer primitive behind `setTimeout`.
#[op2(async)]
async fn op_sandbox_sleep(millis: u32) {
    tokio::time::sleep(Duration::from_millis(u64::from(millis))).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Record a navigation, toast, HUD or other host effect.
#[op2]
fn op_sandbox_effect(state: &mut OpState, #[serde] effect: HostEffect) {
    host(state).effects.push(effect);
}

/// Report the outcome of a no-view run.
#[op2]
fn op_sandbox_settle(state: &mut OpState, #[serde] settlement: Settlement) {
    let host = host(state);
    if host.settlement.is_none() {
        host.settlement = Some(settlement);
        host.settled.notify_one();
    }
}

#[op2]
#[serde]
fn op_sandbox_environment(state: &mut OpState) -> serde_json::Value {
    host(state).environment.clone()
}

#[op2]
#[serde]
fn op_sandbox_preferences(state: &mut OpState) -> Map<String, Value> {
    host(state).preferences.clone()
}

// ─────────────────────────────────────────────────────────────────────────────
// Clipboard
// ─────────────────────────────────────────────────────────────────────────────

#[op2(fast)]
fn op_sandbox_clipboard_write(state: &mut OpState, #[string] text: String) {
    let host = host(state);
    host.clipboard = Some(text.clone());
    host.effects.push(HostEffect::Clipboard { text });
}

#[op2]
#[string]
fn op_sandbox_clipboard_read(state: &mut OpState) -> Option<String> {
    host(state).clipboard.clone()
}

// ─────────────────────────────────────────────────────────────────────────────
// Local storage
// ─────────────────────────────────────────────────────────────────────────────

#[op2]
#[serde]
fn op_sandbox_storage_get(state: &mut OpState, #[string] key: String) -> Option<Value> {
    host(state).storage.get(&key)
}

#[op2]
fn op_sandbox_storage_set(
    state: &mut OpState,
    #[string] key: String,
    #[serde] value: serde_json::Value,
) -> Result<(), JsErrorBox> {
    host(state)
        .storage
        .set(&key, value)
        .map_err(|e| JsErrorBox::generic(e.to_string()))
}

#[op2(fast)]
fn op_sandbox_storage_remove(state: &mut OpState, #[string] key: String) -> Result<(), JsErrorBox> {
    host(state)
        .storage
        .remove(&key)
        .map_err(|e| JsErrorBox::generic(e.to_string()))
}

#[op2]
#[serde]
fn op_sandbox_storage_all(state: &mut OpState) -> BTreeMap<String, Value> {
    host(state).storage.all()
}

#[op2(fast)]
fn op_sandbox_storage_clear(state: &mut OpState) -> Result<(), JsErrorBox> {
    host(state)
        .storage
        .clear()
        .map_err(|e| JsErrorBox::generic(e.to_string()))
}

/// The `deno_core` extension carrying every sandbox op.
pub fn sandbox_extension() -> Extension {
    let ops = vec![
        op_sandbox_resolve(),
        op_sandbox_log(),
        op_sandbox_sleep(),
        op_sandbox_effect(),
        op_sandbox_settle(),
        op_sandbox_environment(),
        op_sandbox_preferences(),
        op_sandbox_clipboard_write(),
        op_sandbox_clipboard_read(),
        op_sandbox_storage_get(),
        op_sandbox_storage_set(),
        op_sandbox_storage_remove(),
        op_sandbox_storage_all(),
        op_sandbox_storage_clear(),
    ];

    Extension {
        name: "nova_sandbox",
        ops: Cow::Owned(ops),
        ..Default::default()
    }
}
