//! Build pipeline: dependency provisioning, bundling and the on-disk cache.

pub mod bundler;
pub mod cache;
pub mod compiler;
pub mod provision;

pub use bundler::{BundleRequest, Bundler, EsbuildBundler};
pub use cache::{BuildCache, DEFAULT_CACHE_DIR};
pub use compiler::{resolve_entry, Compiler, DEFAULT_TARGET};
pub use provision::{DependencyProvisioner, ProvisionOutcome, DEFAULT_INSTALL_TIMEOUT};
