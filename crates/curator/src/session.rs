//! Registry session for one CLI invocation.
//!
//! The local registry lives in a JSON snapshot. A session loads it, hands out
//! guarded clients bound to the invocation's cancellation token, and writes it
//! back after mutating commands.

use anyhow::{Context, Result};
use curator_controller::{Controller, GuardedRegistry, InMemoryRegistry, Manifest, RegistryClient, RunReport};
use curator_protocol::CuratorConfig;
use curator_worker::CancellationToken;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Session {
    config: CuratorConfig,
    snapshot: PathBuf,
    memory: Arc<InMemoryRegistry>,
    cancel: CancellationToken,
}

impl Session {
    pub fn open(config: CuratorConfig, cancel: CancellationToken) -> Result<Self> {
        let snapshot = config.snapshot_path();
        let memory = InMemoryRegistry::load(&snapshot)
            .with_context(|| format!("Failed to load registry snapshot: {}", snapshot.display()))?;
        debug!(snapshot = %snapshot.display(), resources = memory.len(), "Registry session opened");
        Ok(Self {
            config,
            snapshot,
            memory: Arc::new(memory),
            cancel,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.registry.call_timeout_secs)
    }

    /// Unguarded backend, for the controller, which applies its own guard.
    pub fn backend(&self) -> Arc<dyn RegistryClient> {
        self.memory.clone()
    }

    /// Client with the configured per-call timeout and this session's
    /// cancellation token.
    pub fn client(&self) -> Arc<dyn RegistryClient> {
        Arc::new(GuardedRegistry::new(
            self.backend(),
            self.call_timeout(),
            self.cancel.clone(),
        ))
    }

    pub fn save(&self) -> Result<()> {
        self.memory
            .save(&self.snapshot)
            .with_context(|| format!("Failed to write registry snapshot: {}", self.snapshot.display()))
    }

    /// Run `controller` and save the snapshot whatever the outcome. Tasks
    /// that finished before a cancellation or enumeration error have already
    /// stamped their targets, and those stamps must survive.
    pub async fn regenerate(&self, controller: &Controller, manifest: &Manifest) -> Result<RunReport> {
        let result = controller.run(manifest).await;
        self.save()?;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_protocol::{Address, ResourceBody, ResourceKind};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_round_trips_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut config = CuratorConfig::default();
        config.registry.snapshot = Some(dir.path().join("registry.json"));

        let session = Session::open(config.clone(), CancellationToken::new()).unwrap();
        session
            .client()
            .create(None, ResourceKind::Project, "p", ResourceBody::default())
            .await
            .unwrap();
        session.save().unwrap();

        let reopened = Session::open(config, CancellationToken::new()).unwrap();
        let project = reopened.client().get(&Address::project("p").unwrap()).await.unwrap();
        assert_eq!(project.name.to_string(), "projects/p");
    }
}
