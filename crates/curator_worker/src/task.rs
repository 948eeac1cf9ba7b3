//! Unit of work executed by the pool.

use tokio_util::sync::CancellationToken;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// What a successful task did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Created,
    Updated,
    Skipped,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Created => "created",
            TaskOutcome::Updated => "updated",
            TaskOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A queued unit of work: regeneration of one target, or ingestion of one
/// discovered directory.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Short description used in logs and failure reports.
    fn describe(&self) -> String;

    async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<TaskOutcome>;
}
