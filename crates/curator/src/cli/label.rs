//! Label command - set or remove labels on registry resources

use crate::cli::error::HelpfulError;
use crate::cli::open_session;
use anyhow::Result;
use curator::relabel;
use curator_protocol::{CuratorConfig, LabelMutation};
use curator_worker::CancellationToken;

#[derive(Debug, clap::Args)]
pub struct LabelArgs {
    /// Resource address, or a pattern such as projects/p/apis/-
    pub target: String,

    /// Mutations: key=value sets, key- removes
    #[arg(required = true)]
    pub labels: Vec<String>,

    /// Allow changing the value of an existing label
    #[arg(long)]
    pub overwrite: bool,
}

pub fn parse_mutations(args: &[String]) -> Result<Vec<LabelMutation>, HelpfulError> {
    args.iter()
        .map(|arg| LabelMutation::parse(arg).map_err(|err| HelpfulError::invalid_label(arg, &err.to_string())))
        .collect()
}

pub async fn run(args: LabelArgs, config: CuratorConfig, cancel: CancellationToken) -> Result<()> {
    let mutations = parse_mutations(&args.labels)?;
    let page_size = config.registry.page_size;
    let session = open_session(config, cancel)?;

    let summary = relabel(
        session.client().as_ref(),
        &args.target,
        &mutations,
        args.overwrite,
        page_size,
    )
    .await?;
    if summary.changed > 0 {
        session.save()?;
    }
    println!("{} matched, {} changed", summary.matched, summary.changed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mutations_keeps_order() {
        let args: Vec<String> = ["a=1", "b-", "a=2"].iter().map(|s| s.to_string()).collect();
        let parsed = parse_mutations(&args).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[2].to_string(), "a=2");
    }

    #[test]
    fn test_parse_mutations_rejects_bare_key() {
        let args = vec!["a".to_string()];
        assert!(parse_mutations(&args).is_err());
    }
}
