//! Controller run loop.
//!
//! For every rule, enumerate targets, resolve dependencies, decide staleness,
//! and hand one [`RegenerateTask`] per stale target to the worker pool.
//! Enumeration runs on the caller's task while the pool executes, so the
//! bounded queue throttles the scan.
//!
//! Failure scope:
//! - An enumeration error aborts the run.
//! - Resolution, lookup, and rendering errors are recorded for that target.
//! - Task failures are recorded by the pool.

use crate::action::{ActionError, ActionRunner, RenderedAction};
use crate::manifest::{Manifest, Rule};
use crate::predicate::Predicate;
use crate::registry::{get_optional, GuardedRegistry, RegistryClient, RegistryError};
use crate::resolver::{ResolveError, Resolver};
use crate::staleness::Staleness;
use crate::targets::{enumerate_targets, Existing, Target};
use crate::task::RegenerateTask;
use curator_protocol::defaults::{DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_PAGE_SIZE};
use curator_protocol::{Address, Revision};
use curator_worker::{CancellationToken, PoolConfig, PoolReport, SubmitError, TaskSender, WorkerPool};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    InvalidManifest(#[from] crate::manifest::ManifestError),

    #[error("failed to enumerate targets of rule {rule} ('{pattern}'): {source}")]
    Enumeration {
        rule: usize,
        pattern: String,
        source: RegistryError,
    },

    #[error("run cancelled")]
    Cancelled,
}

/// Per-target failure; never stops the run.
#[derive(Debug, Error)]
enum TargetError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to read target: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to render action: {0}")]
    Action(#[from] ActionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    pub pool: PoolConfig,
    pub page_size: usize,
    pub call_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

/// A target that needs regenerating, with its rendered action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedTask {
    pub rule: usize,
    pub target: Address,
    pub command: String,
    pub staleness: Staleness,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub rule: usize,
    pub target: String,
    pub error: String,
}

/// Outcome of the scan, with or without execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub tasks: Vec<PlannedTask>,
    pub up_to_date: u64,
    pub inapplicable: u64,
    pub failures: Vec<TargetFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub manifest: String,
    pub planned: usize,
    pub up_to_date: u64,
    pub inapplicable: u64,
    pub target_failures: Vec<TargetFailure>,
    pub pool: PoolReport,
}

impl RunReport {
    pub fn created(&self) -> u64 {
        self.pool.created
    }

    pub fn updated(&self) -> u64 {
        self.pool.updated
    }

    pub fn skipped(&self) -> u64 {
        self.pool.skipped
    }

    /// Failed tasks plus targets that could not be evaluated.
    pub fn failed(&self) -> u64 {
        self.pool.failed + self.target_failures.len() as u64
    }

    pub fn is_clean(&self) -> bool {
        self.target_failures.is_empty() && self.pool.is_clean()
    }
}

enum Verdict {
    Regenerate(PlannedTask, Revision, bool),
    UpToDate,
    Inapplicable,
}

pub struct Controller {
    registry: Arc<dyn RegistryClient>,
    task_registry: Arc<dyn RegistryClient>,
    predicate: Arc<dyn Predicate>,
    runner: Arc<dyn ActionRunner>,
    config: ControllerConfig,
    cancel: CancellationToken,
}

impl Controller {
    /// Registry calls are bounded by `config.call_timeout`. Scan calls abort
    /// when `cancel` fires; calls made by dispatched tasks do not, so an
    /// action that ran is always recorded.
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        predicate: Arc<dyn Predicate>,
        runner: Arc<dyn ActionRunner>,
        config: ControllerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let task_registry = GuardedRegistry::timeout_only(Arc::clone(&registry), config.call_timeout);
        let guarded = GuardedRegistry::new(registry, config.call_timeout, cancel.clone());
        Self {
            registry: Arc::new(guarded),
            task_registry: Arc::new(task_registry),
            predicate,
            runner,
            config,
            cancel,
        }
    }

    /// Everything `run` would do, without executing any action.
    pub async fn plan(&self, manifest: &Manifest) -> Result<Plan, ControllerError> {
        let plan = self.scan(manifest, None).await?;
        info!(
            manifest = %manifest.name,
            tasks = plan.tasks.len(),
            up_to_date = plan.up_to_date,
            inapplicable = plan.inapplicable,
            failures = plan.failures.len(),
            "Plan complete"
        );
        Ok(plan)
    }

    pub async fn run(&self, manifest: &Manifest) -> Result<RunReport, ControllerError> {
        info!(manifest = %manifest.name, rules = manifest.rules.len(), "Starting run");
        let pool = WorkerPool::new(self.config.pool, self.cancel.child_token());
        let sender = pool.sender().map_err(|_| ControllerError::Cancelled)?;

        let scanned = self.scan(manifest, Some(&sender)).await;
        drop(sender);
        let pool_report = pool.wait().await;
        let plan = scanned?;

        let report = RunReport {
            manifest: manifest.name.clone(),
            planned: plan.tasks.len(),
            up_to_date: plan.up_to_date,
            inapplicable: plan.inapplicable,
            target_failures: plan.failures,
            pool: pool_report,
        };
        info!(
            manifest = %report.manifest,
            planned = report.planned,
            created = report.created(),
            updated = report.updated(),
            up_to_date = report.up_to_date,
            failed = report.failed(),
            "Run complete"
        );
        Ok(report)
    }

    async fn scan(&self, manifest: &Manifest, sender: Option<&TaskSender>) -> Result<Plan, ControllerError> {
        let mut plan = Plan::default();
        let mut seen: HashSet<(usize, Address)> = HashSet::new();

        for rule in &manifest.rules {
            if self.cancel.is_cancelled() {
                return Err(ControllerError::Cancelled);
            }

            let targets = enumerate_targets(self.registry.as_ref(), rule, self.config.page_size)
                .await
                .map_err(|source| match source {
                    RegistryError::Cancelled => ControllerError::Cancelled,
                    source => ControllerError::Enumeration {
                        rule: rule.index,
                        pattern: rule.target.to_string(),
                        source,
                    },
                })?;

            for target in targets {
                if self.cancel.is_cancelled() {
                    return Err(ControllerError::Cancelled);
                }
                if !seen.insert((rule.index, target.address.clone())) {
                    continue;
                }

                let address = target.address.clone();
                match self.evaluate(rule, target).await {
                    Ok(Verdict::Regenerate(planned, revision, existed)) => {
                        debug!(rule = rule.index, target = %planned.target, state = %planned.staleness, "Needs regeneration");
                        if let Some(sender) = sender {
                            let task = RegenerateTask::new(
                                Arc::clone(&self.task_registry),
                                Arc::clone(&self.runner),
                                RenderedAction {
                                    rule: planned.rule,
                                    target: planned.target.clone(),
                                    command: planned.command.clone(),
                                },
                                revision,
                                existed,
                            );
                            sender.submit(Box::new(task)).await.map_err(|err| match err {
                                SubmitError::Cancelled | SubmitError::Closed => ControllerError::Cancelled,
                            })?;
                        }
                        plan.tasks.push(planned);
                    }
                    Ok(Verdict::UpToDate) => plan.up_to_date += 1,
                    Ok(Verdict::Inapplicable) => plan.inapplicable += 1,
                    Err(err) => {
                        warn!(rule = rule.index, target = %address, error = %err, "Target skipped");
                        plan.failures.push(TargetFailure {
                            rule: rule.index,
                            target: address.to_string(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        Ok(plan)
    }

    async fn evaluate(&self, rule: &Rule, target: Target) -> Result<Verdict, TargetError> {
        let resolver = Resolver::new(self.registry.as_ref(), self.predicate.as_ref(), self.config.page_size);
        let resolution = resolver.resolve(rule, &target.address).await?;
        if !resolution.is_applicable() {
            return Ok(Verdict::Inapplicable);
        }

        let existing = match target.existing {
            Existing::Listed(resource) => Some(resource),
            Existing::Unknown => get_optional(self.registry.as_ref(), &target.address).await?,
        };

        let staleness = Staleness::evaluate(existing.as_ref(), &resolution);
        let Some(revision) = staleness.latest() else {
            return Ok(Verdict::Inapplicable);
        };
        if !staleness.needs_regeneration() {
            return Ok(Verdict::UpToDate);
        }

        let command = rule.action.render(&target.address, &target.captures, &resolution)?;
        Ok(Verdict::Regenerate(
            PlannedTask {
                rule: rule.index,
                target: target.address,
                command,
                staleness,
            },
            revision,
            existing.is_some(),
        ))
    }
}
