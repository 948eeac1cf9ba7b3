//! In-process registry backend.
//!
//! Holds resources in a sorted map keyed by revision-less name, so listings
//! are deterministic. Every mutation advances a monotonic clock, which makes
//! "later write" and "newer revision" the same thing. State can be loaded
//! from and saved to a JSON snapshot.

use super::{RegistryClient, RegistryError, RegistryResult};
use crate::predicate::{BasicPredicate, Predicate};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use curator_protocol::{
    Address, Labels, Page, PageRequest, Pattern, Resource, ResourceBody, ResourceKind, Revision,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    revision_counter: u64,
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Default)]
struct MemoryState {
    resources: BTreeMap<String, Resource>,
    last_tick: Option<Revision>,
    revision_counter: u64,
}

impl MemoryState {
    /// Strictly increasing timestamp for the next mutation.
    fn tick(&mut self) -> Revision {
        let now = Utc::now();
        let next = match self.last_tick {
            Some(last) if now <= last => last + ChronoDuration::milliseconds(1),
            _ => now,
        };
        self.last_tick = Some(next);
        next
    }

    fn next_revision_id(&mut self) -> String {
        self.revision_counter += 1;
        format!("{:08x}", self.revision_counter)
    }

    fn key(name: &Address) -> String {
        name.without_revision().to_string()
    }

    fn lookup(&self, name: &Address) -> RegistryResult<&Resource> {
        let resource = self
            .resources
            .get(&Self::key(name))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        match name.revision() {
            Some(rev) if resource.revision_id.as_deref() != Some(rev) => {
                Err(RegistryError::NotFound(name.to_string()))
            }
            _ => Ok(resource),
        }
    }

    fn require_parent(&self, name: &Address) -> RegistryResult<()> {
        match name.parent() {
            Some(parent) if !self.resources.contains_key(&Self::key(&parent)) => {
                Err(RegistryError::NotFound(parent.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn insert(&mut self, name: Address, body: ResourceBody) -> Resource {
        let now = self.tick();
        let revision_id = (name.kind() == ResourceKind::Spec).then(|| self.next_revision_id());
        let resource = Resource {
            name: name.without_revision(),
            mime_type: body.mime_type,
            labels: body.labels,
            annotations: body.annotations,
            revision_id,
            create_time: now,
            update_time: now,
            contents: body.contents,
        };
        self.resources.insert(Self::key(&name), resource.clone());
        resource
    }
}

pub struct InMemoryRegistry {
    state: RwLock<MemoryState>,
    predicate: Arc<dyn Predicate>,
    faults: Mutex<HashMap<String, RegistryError>>,
    latency: Mutex<Option<Duration>>,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_predicate(Arc::new(BasicPredicate))
    }

    pub fn with_predicate(predicate: Arc<dyn Predicate>) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            predicate,
            faults: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
        }
    }

    /// Load a snapshot, or start empty if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let registry = Self::new();
        if !path.exists() {
            return Ok(registry);
        }
        let snapshot: Snapshot = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        {
            let mut state = registry.write_state();
            state.revision_counter = snapshot.revision_counter;
            for resource in snapshot.resources {
                state.last_tick = state.last_tick.max(Some(resource.update_time));
                state
                    .resources
                    .insert(MemoryState::key(&resource.name), resource);
            }
            info!(path = %path.display(), resources = state.resources.len(), "Loaded registry snapshot");
        }
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = {
            let state = self.read_state();
            Snapshot {
                revision_counter: state.revision_counter,
                resources: state.resources.values().cloned().collect(),
            }
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        debug!(path = %path.display(), resources = snapshot.resources.len(), "Saved registry snapshot");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read_state().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every `get` of `name` fail with `error`.
    pub fn inject_fault(&self, name: &Address, error: RegistryError) {
        self.lock_faults().insert(name.to_string(), error);
    }

    pub fn clear_faults(&self) {
        self.lock_faults().clear();
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        match self.latency.lock() {
            Ok(mut slot) => *slot = Some(latency),
            Err(poisoned) => *poisoned.into_inner() = Some(latency),
        }
    }

    /// Bump a resource's update time; specs also get a new revision id.
    pub fn touch(&self, name: &Address) -> RegistryResult<Resource> {
        let mut state = self.write_state();
        state.lookup(name)?;
        let now = state.tick();
        let revision_id = (name.kind() == ResourceKind::Spec).then(|| state.next_revision_id());
        let key = MemoryState::key(name);
        let resource = state
            .resources
            .get_mut(&key)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        resource.update_time = now;
        if revision_id.is_some() {
            resource.revision_id = revision_id;
        }
        Ok(resource.clone())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, HashMap<String, RegistryError>> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        let latency = match self.latency.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn get(&self, name: &Address) -> RegistryResult<Resource> {
        self.delay().await;
        if let Some(fault) = self.lock_faults().get(&name.to_string()) {
            return Err(fault.clone());
        }
        self.read_state().lookup(name).cloned()
    }

    async fn list(&self, pattern: &Pattern, filter: &str, page: PageRequest) -> RegistryResult<Page> {
        self.delay().await;
        let offset = match page.page_token.as_deref() {
            None | Some("") => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RegistryError::InvalidArgument(format!("bad page token '{}'", token)))?,
        };

        let state = self.read_state();
        let mut matched = Vec::new();
        for resource in state.resources.values() {
            if pattern.matches(&resource.revision_address()).is_none() {
                continue;
            }
            let keep = self
                .predicate
                .evaluate(filter, &resource.metadata())
                .map_err(|err| RegistryError::InvalidArgument(err.to_string()))?;
            if keep {
                matched.push(resource);
            }
        }

        let size = page.page_size.max(1);
        let items: Vec<Resource> = matched.iter().skip(offset).take(size).map(|r| (*r).clone()).collect();
        let next = offset + items.len();
        Ok(Page {
            items,
            next_page_token: (next < matched.len()).then(|| next.to_string()),
        })
    }

    async fn create(
        &self,
        parent: Option<&Address>,
        kind: ResourceKind,
        id: &str,
        body: ResourceBody,
    ) -> RegistryResult<Resource> {
        self.delay().await;
        let name = match parent {
            Some(parent) => parent.child(kind, id),
            None if kind == ResourceKind::Project => Address::project(id),
            None => {
                return Err(RegistryError::InvalidArgument(format!(
                    "a {} needs a parent",
                    kind
                )))
            }
        }
        .map_err(|err| RegistryError::InvalidArgument(err.to_string()))?;

        let mut state = self.write_state();
        if state.resources.contains_key(&MemoryState::key(&name)) {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        state.require_parent(&name)?;
        Ok(state.insert(name, body))
    }

    async fn set_artifact(&self, name: &Address, body: ResourceBody) -> RegistryResult<Resource> {
        self.delay().await;
        if name.kind() != ResourceKind::Artifact {
            return Err(RegistryError::InvalidArgument(format!(
                "{} is not an artifact",
                name
            )));
        }
        let mut state = self.write_state();
        state.require_parent(name)?;
        let key = MemoryState::key(name);
        let existing_created = state.resources.get(&key).map(|r| r.create_time);
        let mut resource = state.insert(name.clone(), body);
        if let Some(created) = existing_created {
            resource.create_time = created;
            state.resources.insert(key, resource.clone());
        }
        Ok(resource)
    }

    async fn update_labels(&self, name: &Address, labels: Labels) -> RegistryResult<Resource> {
        self.delay().await;
        let mut state = self.write_state();
        state.lookup(name)?;
        let resource = state
            .resources
            .get_mut(&MemoryState::key(name))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        resource.labels = labels;
        Ok(resource.clone())
    }
}
