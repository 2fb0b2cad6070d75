//! On-disk build cache for compiled command bundles.
//!
//! Layout: `<extensions_dir>/<extension>/<cache_dir>/<command>.js`. A cached
//! bundle is fresh only while its modification time is strictly newer than
//! the entry source it was built from. Nothing here deletes bundles on its
//! own; staleness is detected lazily on the next lookup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::extensions::error::{ExtensionError, ExtensionResult};

/// Default name of the per-extension cache directory.
pub const DEFAULT_CACHE_DIR: &str = ".nova-build";

/// Maps (extension, command) pairs to compiled bundle files.
#[derive(Debug, Clone)]
pub struct BuildCache {
    extensions_dir: PathBuf,
    cache_dir: String,
}

impl BuildCache {
    pub fn new(extensions_dir: impl Into<PathBuf>, cache_dir: impl Into<String>) -> Self {
        Self {
            extensions_dir: extensions_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Deterministic bundle location for a command.
    pub fn bundle_path(&self, extension_id: &str, command: &str) -> ExtensionResult<PathBuf> {
        validate_segment(extension_id)?;
        validate_segment(command)?;
        Ok(self
            .extensions_dir
            .join(extension_id)
            .join(&self.cache_dir)
            .join(format!("{}.js", command)))
    }

    /// Return the cached bundle if it is newer than `entry`.
    pub fn lookup(&self, extension_id: &str, command: &str, entry: &Path) -> Option<String> {
        let bundle = self.bundle_path(extension_id, command).ok()?;
        let bundle_mtime = modified(&bundle)?;
        let entry_mtime = modified(entry)?;

        if bundle_mtime <= entry_mtime {
            tracing::debug!(
                extension = %extension_id,
                command = %command,
                "cached bundle is stale"
            );
            return None;
        }

        match fs::read_to_string(&bundle) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(path = %bundle.display(), error = %e, "unreadable cached bundle");
                None
            }
        }
    }

    /// Persist a freshly built bundle, creating the cache directory if needed.
    pub fn store(&self, extension_id: &str, command: &str, text: &str) -> ExtensionResult<PathBuf> {
        let bundle = self.bundle_path(extension_id, command)?;
        if let Some(parent) = bundle.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&bundle, text)?;
        Ok(bundle)
    }

    /// Remove a cached bundle. Returns whether one existed.
    pub fn invalidate(&self, extension_id: &str, command: &str) -> ExtensionResult<bool> {
        let bundle = self.bundle_path(extension_id, command)?;
        match fs::remove_file(&bundle) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Reject names that would escape the extension's directory.
fn validate_segment(name: &str) -> ExtensionResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(ExtensionError::InvalidCommandName(name.to_string()));
    }
    Ok(())
}
