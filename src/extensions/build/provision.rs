//! Dependency provisioning for extensions.
//!
//! Before an extension is bundled its declared npm dependencies must exist
//! on disk. Installation is production-only with lifecycle scripts disabled,
//! and bounded by a timeout. Failures are logged and swallowed: a missing
//! dependency shows up later as a bundler error for the affected command.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::extensions::error::{ExtensionError, ExtensionResult};
use crate::extensions::manifest::ExtensionManifest;

/// Directory where installed dependencies are materialized.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Default bound on a single installation.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(120);

/// What [`DependencyProvisioner::ensure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The dependency directory already existed.
    AlreadyMaterialized,
    /// The manifest declares no dependencies.
    NoDependencies,
    /// The installer ran and succeeded.
    Installed,
    /// The installer failed or could not be started.
    Failed,
    /// The installer exceeded its time budget and was abandoned.
    TimedOut,
}

/// Installs extension dependencies with an external package manager.
#[derive(Debug, Clone)]
pub struct DependencyProvisioner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for DependencyProvisioner {
    fn default() -> Self {
        Self::new("npm", DEFAULT_INSTALL_TIMEOUT)
    }
}

impl DependencyProvisioner {
    /// Create a provisioner using `program` with the standard install flags.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: default_install_args(),
            timeout,
        }
    }

    /// Override the installer arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Make sure the extension's dependencies are on disk. Idempotent.
    pub async fn ensure(&self, extension_dir: &Path) -> ProvisionOutcome {
        if extension_dir.join(DEPENDENCY_DIR).is_dir() {
            return ProvisionOutcome::AlreadyMaterialized;
        }

        let manifest = match ExtensionManifest::load(extension_dir) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(
                    path = %extension_dir.display(),
                    error = %e,
                    "cannot read manifest for dependency install"
                );
                return ProvisionOutcome::Failed;
            }
        };

        if !manifest.declares_dependencies() {
            return ProvisionOutcome::NoDependencies;
        }

        tracing::info!(
            path = %extension_dir.display(),
            count = manifest.dependencies.len(),
            "installing extension dependencies"
        );

        match self.install(extension_dir).await {
            Ok(()) => ProvisionOutcome::Installed,
            Err(ExtensionError::InstallTimeout(limit)) => {
                tracing::error!(
                    path = %extension_dir.display(),
                    timeout = ?limit,
                    "dependency install timed out, giving up"
                );
                ProvisionOutcome::TimedOut
            }
            Err(e) => {
                tracing::error!(
                    path = %extension_dir.display(),
                    error = %e,
                    "dependency install failed"
                );
                ProvisionOutcome::Failed
            }
        }
    }

    async fn install(&self, extension_dir: &Path) -> ExtensionResult<()> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(extension_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| ExtensionError::InstallFailed {
            path: extension_dir.to_path_buf(),
            message: format!("failed to start '{}': {}", self.program, e),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExtensionError::InstallTimeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtensionError::InstallFailed {
                path: extension_dir.to_path_buf(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

fn default_install_args() -> Vec<String> {
    ["install", "--omit=dev", "--ignore-scripts", "--no-audit", "--no-fund"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
