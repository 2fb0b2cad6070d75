//! Extension pipeline for Nova.
//!
//! Extensions are discovered on disk, compiled into single-file bundles and
//! executed inside a `deno_core` sandbox.
//!
//! # Architecture
//!
//! ```text
//! Catalog ─────────► CommandDescriptor list (launcher UI)
//!
//! BundleHost
//! └── Compiler
//!     ├── DependencyProvisioner (npm install, bounded)
//!     ├── BuildCache (<ext>/.nova-build/<command>.js, mtime-validated)
//!     └── Bundler (esbuild)
//!
//! Sandbox ─► JsCommand ─► CommandSession
//!                         ├── NavigationStack
//!                         └── ErrorBoundary
//! ```
//!
//! Every stage contains its own failures: a broken extension or command is
//! logged and skipped, it never takes down discovery or another command.

pub mod build;
mod bundle;
mod catalog;
mod error;
mod manifest;
pub mod sandbox;
pub mod session;

pub use build::{BuildCache, Bundler, Compiler, DependencyProvisioner, EsbuildBundler};
pub use bundle::{BundleHost, ResolvedBundle};
pub use catalog::{command_id, load_icon, Catalog, CommandDescriptor, MIN_ICON_BYTES};
pub use error::{ExtensionError, ExtensionResult};
pub use manifest::{
    CommandConfig, CommandMode, ExtensionManifest, PreferenceConfig, MANIFEST_FILE,
};
pub use sandbox::{CommandContext, JsCommand, Sandbox, SandboxOptions};
pub use session::{CommandSession, FocusTarget, HostEffect, SessionHandle, SessionState};

/// Unique identifier for an extension (its directory name).
pub type ExtensionId = String;

/// Unique identifier for a command within an extension.
pub type CommandId = String;
