//! Curator command-line entry point
//!
//! Regenerates derived artifacts in the API registry from a dependency
//! manifest, and carries the operator commands that feed the registry.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curator_logging::{init_logging, LogConfig};
use curator_protocol::defaults::CANCELLED_BY_USER_MESSAGE;
use curator_protocol::{CuratorConfig, CuratorPaths};
use curator_worker::CancellationToken;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "curator", about = "Keep derived registry artifacts in step with their sources")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Config file (defaults to ~/.curator/config.toml)
    #[arg(long, global = true, env = "CURATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Registry snapshot to operate on
    #[arg(long, global = true, env = "CURATOR_REGISTRY")]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Regenerate derived artifacts whose sources have changed
    Resolve(cli::resolve::ResolveArgs),

    /// Upload API descriptions or manifests
    Upload {
        #[command(subcommand)]
        command: cli::upload::UploadCommand,
    },

    /// Set or remove labels on registry resources
    Label(cli::label::LabelArgs),

    /// Export registry contents
    Export {
        #[command(subcommand)]
        command: cli::export::ExportCommand,
    },

    /// Show configuration and paths
    Config(cli::config::ConfigArgs),
}

fn load_config(cli: &Cli) -> Result<(CuratorConfig, PathBuf)> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| CuratorPaths::from_env().config_file());
    let mut config = CuratorConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if let Some(snapshot) = &cli.registry {
        config.registry.snapshot = Some(snapshot.clone());
    }
    Ok((config, path))
}

async fn run_command(cli: Cli) -> Result<()> {
    let (config, config_path) = load_config(&cli)?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("{}", CANCELLED_BY_USER_MESSAGE);
                cancel.cancel();
            }
        })
    };

    let result = match cli.command {
        Commands::Resolve(args) => cli::resolve::run(args, config, cancel).await,
        Commands::Upload { command } => cli::upload::run(command, config, cancel).await,
        Commands::Label(args) => cli::label::run(args, config, cancel).await,
        Commands::Export { command } => cli::export::run(command, config, cancel).await,
        Commands::Config(args) => cli::config::run(args, &config, &config_path),
    };
    watcher.abort();
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        verbose: cli.verbose,
        quiet: cli.quiet,
        ..LogConfig::new("curator")
    }) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:?}", err);
            None
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start async runtime: {}", err);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run_command(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
