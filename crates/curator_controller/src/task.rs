//! Regeneration task executed by the worker pool.

use crate::action::{ActionRunner, RenderedAction};
use crate::registry::{get_optional, RegistryClient};
use anyhow::{Context, Result};
use async_trait::async_trait;
use curator_protocol::defaults::SOURCE_REVISION_ANNOTATION;
use curator_protocol::{ResourceBody, ResourceKind, Revision};
use curator_worker::{CancellationToken, Task, TaskOutcome};
use std::sync::Arc;
use tracing::debug;

/// Runs one rendered action, then records on the target which source
/// revision it was generated from.
pub struct RegenerateTask {
    registry: Arc<dyn RegistryClient>,
    runner: Arc<dyn ActionRunner>,
    action: RenderedAction,
    source_revision: Revision,
    existed: bool,
}

impl RegenerateTask {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        runner: Arc<dyn ActionRunner>,
        action: RenderedAction,
        source_revision: Revision,
        existed: bool,
    ) -> Self {
        Self {
            registry,
            runner,
            action,
            source_revision,
            existed,
        }
    }

    /// Only artifacts carry annotations; other targets fall back to their
    /// update time on the next pass.
    async fn stamp(&self) -> Result<()> {
        let target = &self.action.target;
        if target.kind() != ResourceKind::Artifact {
            return Ok(());
        }

        let current = get_optional(self.registry.as_ref(), target)
            .await
            .with_context(|| format!("Failed to read {} after action", target))?;
        let mut body = match current {
            Some(resource) => ResourceBody {
                mime_type: resource.mime_type,
                labels: resource.labels,
                annotations: resource.annotations,
                contents: resource.contents,
            },
            None => ResourceBody::default(),
        };
        body.annotations.insert(
            SOURCE_REVISION_ANNOTATION.to_string(),
            self.source_revision.to_rfc3339(),
        );

        self.registry
            .set_artifact(target, body)
            .await
            .with_context(|| format!("Failed to record source revision on {}", target))?;
        debug!(target = %target, revision = %self.source_revision, "Recorded source revision");
        Ok(())
    }
}

#[async_trait]
impl Task for RegenerateTask {
    fn describe(&self) -> String {
        self.action.to_string()
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<TaskOutcome> {
        self.runner
            .run(&self.action, cancel)
            .await
            .with_context(|| format!("Action failed for {}", self.action.target))?;
        self.stamp().await?;

        Ok(if self.existed {
            TaskOutcome::Updated
        } else {
            TaskOutcome::Created
        })
    }
}
