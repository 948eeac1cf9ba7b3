//! Shared logging setup for Curator binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str = "curator=info,curator_controller=info,curator_worker=info";
const VERBOSE_LOG_FILTER: &str = "curator=debug,curator_controller=debug,curator_worker=debug";

/// Logging configuration shared by Curator binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Only warnings and errors reach stderr.
    pub quiet: bool,
    /// Directory for the daily rolling log file. `None` disables file output.
    pub log_dir: Option<PathBuf>,
}

impl<'a> LogConfig<'a> {
    pub fn new(app_name: &'a str) -> Self {
        Self {
            app_name,
            verbose: false,
            quiet: false,
            log_dir: Some(curator_protocol::CuratorPaths::from_env().logs_dir()),
        }
    }
}

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// File name of the rolling log for `app_name`.
pub fn log_file_name(app_name: &str) -> String {
    let sanitized: String = app_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    format!("{}.log", sanitized)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))
}

/// Install the global subscriber: stderr plus an optional daily rolling file.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<WorkerGuard>> {
    let console_filter = if config.quiet {
        EnvFilter::new("warn")
    } else {
        env_filter(config.verbose)
    };

    let mut guard = None;
    let file_layer = match &config.log_dir {
        Some(dir) => {
            ensure_dir(dir)?;
            let appender = tracing_appender::rolling::daily(dir, log_file_name(config.app_name));
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(env_filter(config.verbose)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
