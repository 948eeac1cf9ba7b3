//! Upload commands - bulk proto ingestion and manifest upload

use crate::cli::error::HelpfulError;
use crate::cli::open_session;
use crate::cli::output::{format_duration, print_summary, print_table};
use anyhow::{bail, Result};
use clap::Subcommand;
use curator::{read_manifest_document, upload_manifest, upload_protos};
use curator_protocol::CuratorConfig;
use curator_worker::{CancellationToken, PoolConfig};
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum UploadCommand {
    /// Upload Protocol Buffer descriptions of APIs
    Protos {
        /// Directories to scan for <api path>/<version>/*.proto trees
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Project to upload into (created if missing)
        #[arg(long, env = "CURATOR_PROJECT")]
        project: String,

        /// Number of concurrent workers
        #[arg(long)]
        workers: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload a dependency manifest as a project artifact
    Manifest {
        /// Manifest file (YAML or JSON)
        file: PathBuf,

        /// Project to store the manifest in (defaults to the manifest's own)
        #[arg(long, env = "CURATOR_PROJECT")]
        project: Option<String>,
    },
}

pub async fn run(command: UploadCommand, config: CuratorConfig, cancel: CancellationToken) -> Result<()> {
    match command {
        UploadCommand::Protos {
            dirs,
            project,
            workers,
            json,
        } => {
            if let Some(dir) = dirs.iter().find(|d| !d.is_dir()) {
                return Err(HelpfulError::not_a_directory(dir).into());
            }
            let pool = PoolConfig {
                workers: workers.unwrap_or(config.pool.workers).max(1),
                queue_capacity: config.pool.queue_capacity,
            };
            let session = open_session(config, cancel.clone())?;
            let report = upload_protos(session.client(), &project, &dirs, pool, cancel).await;
            session.save()?;
            let report = report?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&[
                    ("Versions", report.attempted().to_string()),
                    ("Created", report.created.to_string()),
                    ("Already present", report.skipped.to_string()),
                    ("Failed", report.failed.to_string()),
                    ("Elapsed", format_duration(report.elapsed)),
                ]);
                if !report.failures.is_empty() {
                    println!();
                    let rows = report
                        .failures
                        .iter()
                        .map(|f| vec![f.task.clone(), f.error.clone()])
                        .collect();
                    print_table(&["VERSION", "ERROR"], rows);
                }
            }
            if !report.is_clean() {
                bail!("{} uploads failed", report.failed + report.abandoned);
            }
            Ok(())
        }
        UploadCommand::Manifest { file, project } => {
            let doc = read_manifest_document(&file)?;
            let session = open_session(config, cancel)?;
            let stored = upload_manifest(session.client().as_ref(), doc, project.as_deref())
                .await
                .map_err(|err| HelpfulError::manifest_unavailable(&file.display().to_string(), &err))?;
            session.save()?;
            println!("{}", stored.name);
            Ok(())
        }
    }
}
