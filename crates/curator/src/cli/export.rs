//! Export commands

use crate::cli::open_session;
use anyhow::{Context, Result};
use clap::Subcommand;
use curator::export::version_parent;
use curator::export_csv;
use curator_protocol::{CuratorConfig, Pattern};
use curator_worker::CancellationToken;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum ExportCommand {
    /// Export specs under version addresses as CSV
    Csv {
        /// Version addresses; wildcards allowed (projects/p/apis/-/versions/-)
        #[arg(required = true)]
        parents: Vec<String>,

        /// Filter applied to the spec listing
        #[arg(long, default_value = "")]
        filter: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

pub async fn run(command: ExportCommand, config: CuratorConfig, cancel: CancellationToken) -> Result<()> {
    match command {
        ExportCommand::Csv {
            parents,
            filter,
            output,
        } => {
            let parents = parents
                .iter()
                .map(|p| version_parent(p))
                .collect::<Result<Vec<Pattern>>>()?;
            let page_size = config.registry.page_size;
            let session = open_session(config, cancel)?;
            let registry = session.client();

            let rows = match &output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    export_csv(registry.as_ref(), &parents, &filter, page_size, file).await?
                }
                None => export_csv(registry.as_ref(), &parents, &filter, page_size, io::stdout()).await?,
            };
            info!(rows, "Exported specs");
            Ok(())
        }
    }
}
