//! CLI commands for `nova-ext`.
//!
//! Developer tooling around the extension pipeline: list, build, run, config.

pub mod build;
pub mod list;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::HostConfig;
use crate::extensions::{BundleHost, Compiler, DependencyProvisioner, EsbuildBundler};

#[derive(Parser)]
#[command(name = "nova-ext")]
#[command(about = "Build and run Nova extensions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/nova/extensions.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Extensions directory, overriding the config file
    #[arg(long, global = true, value_name = "DIR")]
    pub extensions_dir: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List installed extension commands
    List {
        /// Fuzzy filter over titles and keywords
        query: Option<String>,
    },

    /// Compile a command into its cached bundle
    Build {
        extension: String,
        command: String,

        /// Discard the cached bundle first
        #[arg(long)]
        force: bool,
    },

    /// Build, load and run a command headlessly
    Run {
        extension: String,
        command: String,

        /// Print the rendered view as compact JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write it back to the config file instead of printing it
        #[arg(long)]
        write: bool,
    },
}

/// Parse arguments and run the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::logging::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => HostConfig::load_from(path)?,
        None => HostConfig::load(),
    };
    if let Some(dir) = cli.extensions_dir {
        config.extensions.directory = dir;
    }

    // deno_core runtimes are !Send, so everything stays on one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    match cli.command {
        Commands::List { query } => list::run_list(&config, query.as_deref()),
        Commands::Build {
            extension,
            command,
            force,
        } => runtime.block_on(build::run_build(&config, &extension, &command, force)),
        Commands::Run {
            extension,
            command,
            json,
        } => runtime.block_on(run::run_command(&config, &extension, &command, json)),
        Commands::Config { write } => run_config(&config, cli.config.as_deref(), write),
    }
}

/// Print the effective config, or save it to `path` (the default file when unset).
fn run_config(config: &HostConfig, path: Option<&Path>, write: bool) -> Result<()> {
    if !write {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let target = match path {
        Some(path) => {
            config.save_to(path)?;
            path.to_path_buf()
        }
        None => {
            config.save()?;
            HostConfig::config_path()
        }
    };
    println!("Wrote {}", target.display());
    Ok(())
}

/// Compiler configured from the host config.
pub fn compiler(config: &HostConfig) -> Compiler {
    let provisioner =
        DependencyProvisioner::new(&config.dependencies.installer, config.install_timeout());
    let bundler = Arc::new(EsbuildBundler::new(&config.build.bundler));

    Compiler::new(config.extensions_dir(), provisioner, bundler)
        .with_target(&config.build.target)
        .with_cache_dir(&config.build.cache_dir)
}

pub fn bundle_host(config: &HostConfig) -> BundleHost {
    BundleHost::new(compiler(config))
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
