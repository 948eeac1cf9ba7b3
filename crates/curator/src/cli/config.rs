//! Config command - show resolved paths and settings

use crate::cli::output::print_summary;
use anyhow::Result;
use curator_protocol::{CuratorConfig, CuratorPaths};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ConfigView<'a> {
    home: PathBuf,
    config_path: &'a Path,
    config_exists: bool,
    snapshot_path: PathBuf,
    logs_dir: PathBuf,
    settings: &'a CuratorConfig,
}

pub fn run(args: ConfigArgs, config: &CuratorConfig, config_path: &Path) -> Result<()> {
    let paths = CuratorPaths::from_env();
    let view = ConfigView {
        home: paths.home().to_path_buf(),
        config_path,
        config_exists: config_path.exists(),
        snapshot_path: config.snapshot_path(),
        logs_dir: paths.logs_dir(),
        settings: config,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let config_file = if view.config_exists {
        view.config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", view.config_path.display())
    };
    print_summary(&[
        ("Home", view.home.display().to_string()),
        ("Config", config_file),
        ("Registry snapshot", view.snapshot_path.display().to_string()),
        ("Logs", view.logs_dir.display().to_string()),
        ("Workers", config.pool.workers.to_string()),
        ("Queue capacity", config.pool.queue_capacity.to_string()),
        ("Call timeout", format!("{}s", config.registry.call_timeout_secs)),
        ("Page size", config.registry.page_size.to_string()),
        ("Action program", config.action.program.clone()),
    ]);
    Ok(())
}
