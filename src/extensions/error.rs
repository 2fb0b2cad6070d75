//! Error types for the extension system.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in the extension pipeline.
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Extension directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Manifest not found in extension: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid manifest in {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("Command '{command}' not found in extension '{extension}'")]
    CommandNotFound { extension: String, command: String },

    #[error("Invalid command name '{0}'")]
    InvalidCommandName(String),

    #[error("No entry file for command '{command}' in extension '{extension}'")]
    EntryNotFound { extension: String, command: String },

    #[error("Dependency installation failed in {path}: {message}")]
    InstallFailed { path: PathBuf, message: String },

    #[error("Dependency installation timed out after {0:?}")]
    InstallTimeout(Duration),

    #[error("Bundler failed: {0}")]
    BundleFailed(String),

    #[error("Failed to load bundle: {0}")]
    LoadFailed(String),

    #[error("JavaScript error: {0}")]
    JavaScript(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for extension operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;
