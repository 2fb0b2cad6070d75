//! Nova extension pipeline.
//!
//! Discovers extensions on disk, compiles their commands into single-file
//! bundles and runs those bundles in a sandboxed JavaScript runtime.
//!
//! # Architecture
//!
//! - [`extensions`] - catalog, build pipeline, sandbox and command sessions
//! - [`config`] - host configuration (`~/.config/nova/extensions.toml`)
//! - [`cli`] - the `nova-ext` developer commands
//!
//! # Example
//!
//! ```ignore
//! use nova_extensions::extensions::{BundleHost, Compiler, CommandContext, CommandSession, Sandbox};
//!
//! let host = BundleHost::new(Compiler::with_defaults("/path/to/extensions"));
//! let bundle = host.resolve("weather", "today").await?;
//!
//! let mut sandbox = Sandbox::default();
//! let ctx = CommandContext::new(&bundle.extension_id, &bundle.command_name);
//! let entry = sandbox.load(&bundle.bundle_text, &ctx)?;
//!
//! let mut session = CommandSession::new(entry, bundle.mode);
//! session.start().await;
//! println!("{:?}", session.view());
//! ```

pub mod cli;
pub mod config;
pub mod extensions;
pub mod logging;

pub use config::{ConfigError, HostConfig};
pub use extensions::{ExtensionError, ExtensionResult};
