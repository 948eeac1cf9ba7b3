//! Resolve command - regenerate stale derived artifacts
//!
//! Loads a manifest, scans the registry for targets whose sources changed,
//! and runs the rule's action for each through the configured program.

use crate::cli::error::HelpfulError;
use crate::cli::open_session;
use crate::cli::output::{format_duration, print_summary, print_table};
use anyhow::{bail, Result};
use curator::load_manifest;
use curator_controller::{
    ActionRunner, BasicPredicate, CommandRunner, Controller, ControllerConfig, Plan, RunReport,
};
use curator_protocol::CuratorConfig;
use curator_worker::{CancellationToken, PoolConfig};
use std::sync::Arc;

#[derive(Debug, clap::Args)]
pub struct ResolveArgs {
    /// Manifest file, or the address of a manifest artifact
    pub manifest: String,

    /// List the work without running any action
    #[arg(long)]
    pub dry_run: bool,

    /// Program invoked with each rendered action as its arguments
    #[arg(long, env = "CURATOR_ACTION_PROGRAM")]
    pub program: Option<String>,

    /// Number of concurrent workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn controller_config(args: &ResolveArgs, config: &CuratorConfig) -> ControllerConfig {
    ControllerConfig {
        pool: PoolConfig {
            workers: args.workers.unwrap_or(config.pool.workers).max(1),
            queue_capacity: config.pool.queue_capacity,
        },
        page_size: config.registry.page_size,
        call_timeout: std::time::Duration::from_secs(config.registry.call_timeout_secs),
    }
}

pub async fn run(args: ResolveArgs, config: CuratorConfig, cancel: CancellationToken) -> Result<()> {
    let program = args.program.clone().unwrap_or_else(|| config.action.program.clone());
    let controller_config = controller_config(&args, &config);
    let session = open_session(config, cancel.clone())?;

    let manifest = load_manifest(session.client().as_ref(), &args.manifest)
        .await
        .map_err(|err| HelpfulError::manifest_unavailable(&args.manifest, &err))?;

    let runner: Arc<dyn ActionRunner> = Arc::new(CommandRunner::new(program));
    let controller = Controller::new(
        session.backend(),
        Arc::new(BasicPredicate),
        runner,
        controller_config,
        cancel,
    );

    if args.dry_run {
        let plan = controller.plan(&manifest).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    let report = session.regenerate(&controller, &manifest).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_clean() {
        bail!(
            "{} of {} targets failed",
            report.failed(),
            report.planned + report.target_failures.len()
        );
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    if plan.tasks.is_empty() {
        println!("Nothing to do.");
    } else {
        let rows = plan
            .tasks
            .iter()
            .map(|t| vec![t.rule.to_string(), t.target.to_string(), t.staleness.to_string(), t.command.clone()])
            .collect();
        print_table(&["RULE", "TARGET", "STATE", "ACTION"], rows);
    }
    println!();
    print_summary(&[
        ("Would run", plan.tasks.len().to_string()),
        ("Up to date", plan.up_to_date.to_string()),
        ("Inapplicable", plan.inapplicable.to_string()),
        ("Failed", plan.failures.len().to_string()),
    ]);
    for failure in &plan.failures {
        println!("  {} ({})", failure.target, failure.error);
    }
}

fn print_report(report: &RunReport) {
    print_summary(&[
        ("Manifest", report.manifest.clone()),
        ("Planned", report.planned.to_string()),
        ("Created", report.created().to_string()),
        ("Updated", report.updated().to_string()),
        ("Skipped", report.skipped().to_string()),
        ("Up to date", report.up_to_date.to_string()),
        ("Inapplicable", report.inapplicable.to_string()),
        ("Failed", report.failed().to_string()),
        ("Elapsed", format_duration(report.pool.elapsed)),
    ]);

    let failures: Vec<Vec<String>> = report
        .target_failures
        .iter()
        .map(|f| vec![f.target.clone(), f.error.clone()])
        .chain(report.pool.failures.iter().map(|f| vec![f.task.clone(), f.error.clone()]))
        .collect();
    if !failures.is_empty() {
        println!();
        print_table(&["TARGET", "ERROR"], failures);
    }
}
