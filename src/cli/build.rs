//! `nova-ext build` - compile one command into the build cache.

use std::fs;

use anyhow::{Context, Result};
use console::style;

use crate::config::HostConfig;

use super::{compiler, format_size};

pub async fn run_build(config: &HostConfig, extension: &str, command: &str, force: bool) -> Result<()> {
    let compiler = compiler(config);

    if force {
        let removed = compiler
            .cache()
            .invalidate(extension, command)
            .context("Failed to clear cached bundle")?;
        if removed {
            println!(
                "{} {}",
                style("✓").green().bold(),
                style("Removed cached bundle").cyan()
            );
        }
    }

    compiler
        .try_compile(extension, command)
        .await
        .with_context(|| format!("Failed to build {}/{}", extension, command))?;

    let path = compiler.cache().bundle_path(extension, command)?;
    let size = fs::metadata(&path)
        .with_context(|| format!("Bundle missing at {}", path.display()))?
        .len();

    println!(
        "{} {} {}",
        style("✓").green().bold(),
        style(format!("Bundled {}/{}", extension, command)).cyan(),
        style(format_size(size)).dim()
    );
    println!("  {}", path.display());

    Ok(())
}
