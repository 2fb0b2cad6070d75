//! Bundler abstraction and the esbuild implementation.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::extensions::error::{ExtensionError, ExtensionResult};

/// Everything a bundler needs to turn one entry file into one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    /// Entry source file.
    pub entry: PathBuf,
    /// Directory the bundler runs in (the extension root).
    pub working_dir: PathBuf,
    /// Extra module resolution roots.
    pub node_paths: Vec<PathBuf>,
    /// Module names left as runtime `require` calls.
    pub externals: Vec<String>,
    /// Output language level, e.g. `es2020`.
    pub target: String,
    /// Build-time constant substitutions (`name`, `replacement`).
    pub defines: Vec<(String, String)>,
    /// Module the automatic JSX transform imports from.
    pub jsx_import_source: String,
    /// Compiler configuration that replaces the extension's own.
    pub tsconfig_raw: String,
}

/// Produces a single-file bundle for a [`BundleRequest`].
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Bundle the request and return the output text.
    async fn bundle(&self, request: &BundleRequest) -> ExtensionResult<String>;
}

/// Runs the `esbuild` CLI and captures the bundle from stdout.
#[derive(Debug, Clone)]
pub struct EsbuildBundler {
    program: String,
}

impl Default for EsbuildBundler {
    fn default() -> Self {
        Self::new("esbuild")
    }
}

impl EsbuildBundler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Command-line arguments for a request.
    pub fn args(request: &BundleRequest) -> Vec<String> {
        let mut args = vec![
            request.entry.to_string_lossy().into_owned(),
            "--bundle".to_string(),
            "--format=cjs".to_string(),
            "--platform=node".to_string(),
            format!("--target={}", request.target),
            "--jsx=automatic".to_string(),
            format!("--jsx-import-source={}", request.jsx_import_source),
            format!("--tsconfig-raw={}", request.tsconfig_raw),
            "--charset=utf8".to_string(),
            "--log-level=error".to_string(),
        ];

        for external in &request.externals {
            args.push(format!("--external:{}", external));
        }
        for (name, value) in &request.defines {
            args.push(format!("--define:{}={}", name, value));
        }

        args
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    async fn bundle(&self, request: &BundleRequest) -> ExtensionResult<String> {
        let mut command = Command::new(&self.program);
        command
            .args(Self::args(request))
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !request.node_paths.is_empty() {
            let node_path = std::env::join_paths(&request.node_paths)
                .map_err(|e| ExtensionError::BundleFailed(format!("invalid NODE_PATH: {}", e)))?;
            command.env("NODE_PATH", node_path);
        }

        let output = command
            .output()
            .await
            .map_err(|e| ExtensionError::BundleFailed(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtensionError::BundleFailed(stderr.trim().to_string()));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| ExtensionError::BundleFailed(format!("bundle is not UTF-8: {}", e)))
    }
}
