//! Bundle host: a runnable bundle plus its display metadata for one command.

use std::path::Path;

use super::build::Compiler;
use super::manifest::{CommandMode, ExtensionManifest};

/// A compiled command ready to hand to the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBundle {
    pub extension_id: String,
    pub command_name: String,
    pub bundle_text: String,
    pub title: String,
    pub mode: CommandMode,
}

/// Combines the compiler with manifest lookups.
pub struct BundleHost {
    compiler: Compiler,
}

impl BundleHost {
    pub fn new(compiler: Compiler) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Compile a command and attach its declared title and mode.
    ///
    /// The manifest is read again after compiling; if it cannot be parsed or
    /// does not list the command, the title falls back to the command name
    /// and the mode to [`CommandMode::View`].
    pub async fn resolve(&self, extension_id: &str, command: &str) -> Option<ResolvedBundle> {
        let bundle_text = self.compiler.compile(extension_id, command).await?;
        let extension_dir = self.compiler.extensions_dir().join(extension_id);
        let (title, mode) = command_presentation(&extension_dir, extension_id, command);

        Some(ResolvedBundle {
            extension_id: extension_id.to_string(),
            command_name: command.to_string(),
            bundle_text,
            title,
            mode,
        })
    }
}

fn command_presentation(extension_dir: &Path, extension_id: &str, command: &str) -> (String, CommandMode) {
    let manifest = match ExtensionManifest::load(extension_dir) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::debug!(command = %command, error = %e, "manifest unreadable after build");
            return (command.to_string(), CommandMode::View);
        }
    };

    match manifest.require_command(extension_id, command) {
        Ok(config) => (config.display_title().to_string(), config.mode),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to default presentation");
            (command.to_string(), CommandMode::View)
        }
    }
}
