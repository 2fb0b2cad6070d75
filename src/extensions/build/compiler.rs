//! Command compiler: entry resolution, provisioning, caching and bundling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::extensions::error::{ExtensionError, ExtensionResult};
use crate::extensions::sandbox::bundler_externals;

use super::bundler::{BundleRequest, Bundler, EsbuildBundler};
use super::cache::{BuildCache, DEFAULT_CACHE_DIR};
use super::provision::{DependencyProvisioner, DEPENDENCY_DIR};

/// Baseline language level of emitted bundles.
pub const DEFAULT_TARGET: &str = "es2020";

/// Candidate entry files relative to the extension root, `{}` being the command name.
const ENTRY_CANDIDATES: &[&str] = &[
    "src/{}.tsx",
    "src/{}.ts",
    "src/{}.jsx",
    "src/{}.js",
    "src/index.tsx",
    "src/index.ts",
];

/// Find the entry source file for a command.
///
/// Command-specific files win over the generic `index` fallback.
pub fn resolve_entry(extension_dir: &Path, command: &str) -> Option<PathBuf> {
    ENTRY_CANDIDATES
        .iter()
        .map(|pattern| extension_dir.join(pattern.replace("{}", command)))
        .find(|candidate| candidate.is_file())
}

/// Turns extension sources into cached single-file bundles.
pub struct Compiler {
    extensions_dir: PathBuf,
    cache: BuildCache,
    provisioner: DependencyProvisioner,
    bundler: Arc<dyn Bundler>,
    target: String,
}

impl Compiler {
    pub fn new(
        extensions_dir: impl Into<PathBuf>,
        provisioner: DependencyProvisioner,
        bundler: Arc<dyn Bundler>,
    ) -> Self {
        let extensions_dir = extensions_dir.into();
        Self {
            cache: BuildCache::new(extensions_dir.clone(), DEFAULT_CACHE_DIR),
            extensions_dir,
            provisioner,
            bundler,
            target: DEFAULT_TARGET.to_string(),
        }
    }

    /// Compiler with the stock npm provisioner and esbuild bundler.
    pub fn with_defaults(extensions_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            extensions_dir,
            DependencyProvisioner::default(),
            Arc::new(EsbuildBundler::default()),
        )
    }

    /// Override the output language level.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Override the cache directory name used inside each extension.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<String>) -> Self {
        self.cache = BuildCache::new(self.extensions_dir.clone(), cache_dir);
        self
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn extensions_dir(&self) -> &Path {
        &self.extensions_dir
    }

    /// Compile a command, returning the bundle text.
    ///
    /// Every failure is logged with the command identity and yields `None`.
    pub async fn compile(&self, extension_id: &str, command: &str) -> Option<String> {
        match self.try_compile(extension_id, command).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(
                    extension = %extension_id,
                    command = %command,
                    error = %e,
                    "compile failed"
                );
                None
            }
        }
    }

    /// Compile a command, propagating the failure reason.
    pub async fn try_compile(&self, extension_id: &str, command: &str) -> ExtensionResult<String> {
        // Rejects traversal in either name before touching the filesystem
        self.cache.bundle_path(extension_id, command)?;

        let extension_dir = self.extensions_dir.join(extension_id);
        if !extension_dir.is_dir() {
            return Err(ExtensionError::DirectoryNotFound(extension_dir));
        }

        let entry =
            resolve_entry(&extension_dir, command).ok_or_else(|| ExtensionError::EntryNotFound {
                extension: extension_id.to_string(),
                command: command.to_string(),
            })?;

        self.provisioner.ensure(&extension_dir).await;

        if let Some(text) = self.cache.lookup(extension_id, command, &entry) {
            tracing::debug!(extension = %extension_id, command = %command, "bundle cache hit");
            return Ok(text);
        }

        tracing::info!(
            extension = %extension_id,
            command = %command,
            entry = %entry.display(),
            "bundling command"
        );

        let request = self.request(&extension_dir, entry);
        let text = self.bundler.bundle(&request).await?;
        let path = self.cache.store(extension_id, command, &text)?;

        tracing::debug!(path = %path.display(), bytes = text.len(), "bundle written");
        Ok(text)
    }

    fn request(&self, extension_dir: &Path, entry: PathBuf) -> BundleRequest {
        let tsconfig_raw = serde_json::json!({
            "compilerOptions": {
                "strict": false,
                "esModuleInterop": true,
                "jsx": "react-jsx",
            }
        })
        .to_string();

        BundleRequest {
            entry,
            working_dir: extension_dir.to_path_buf(),
            node_paths: vec![extension_dir.join(DEPENDENCY_DIR)],
            externals: bundler_externals(),
            target: self.target.clone(),
            defines: vec![
                (
                    "process.env.NODE_ENV".to_string(),
                    "\"production\"".to_string(),
                ),
                ("global".to_string(), "globalThis".to_string()),
            ],
            jsx_import_source: "react".to_string(),
            tsconfig_raw,
        }
    }
}
