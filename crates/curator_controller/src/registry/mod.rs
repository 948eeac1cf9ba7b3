//! Registry client boundary.
//!
//! The controller talks to the registry only through [`RegistryClient`].
//! [`GuardedRegistry`] wraps any client with a per-call timeout and the run's
//! cancellation token; [`memory::InMemoryRegistry`] is the local backend used
//! by tests and the CLI.

pub mod memory;

use async_trait::async_trait;
use curator_protocol::{
    Address, Labels, Page, PageRequest, Pattern, Resource, ResourceBody, ResourceKind,
};
use curator_worker::CancellationToken;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use memory::InMemoryRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("registry call timed out after {0:?}")]
    Timeout(Duration),

    #[error("registry call cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, RegistryError::AlreadyExists(_))
    }
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn get(&self, name: &Address) -> RegistryResult<Resource>;

    /// One page of resources matching `pattern` that also pass `filter`.
    async fn list(&self, pattern: &Pattern, filter: &str, page: PageRequest) -> RegistryResult<Page>;

    /// Create `id` of `kind` under `parent` (`None` for projects).
    async fn create(
        &self,
        parent: Option<&Address>,
        kind: ResourceKind,
        id: &str,
        body: ResourceBody,
    ) -> RegistryResult<Resource>;

    /// Create or replace an artifact.
    async fn set_artifact(&self, name: &Address, body: ResourceBody) -> RegistryResult<Resource>;

    /// Replace the labels of any resource. Labels are metadata, so the
    /// resource's revision is unchanged.
    async fn update_labels(&self, name: &Address, labels: Labels) -> RegistryResult<Resource>;
}

/// `get`, mapping NotFound to `None`.
pub async fn get_optional(
    registry: &dyn RegistryClient,
    name: &Address,
) -> RegistryResult<Option<Resource>> {
    match registry.get(name).await {
        Ok(resource) => Ok(Some(resource)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Follow page tokens until the listing is exhausted.
pub async fn list_all(
    registry: &dyn RegistryClient,
    pattern: &Pattern,
    filter: &str,
    page_size: usize,
) -> RegistryResult<Vec<Resource>> {
    let mut request = PageRequest::first(page_size.max(1));
    let mut items = Vec::new();
    loop {
        let page = registry.list(pattern, filter, request.clone()).await?;
        items.extend(page.items);
        match page.next_page_token {
            Some(token) if !token.is_empty() => request = request.next(token),
            _ => break,
        }
    }
    debug!(pattern = %pattern, count = items.len(), "Listed resources");
    Ok(items)
}

/// Get a resource, creating it if absent. A concurrent creator winning the
/// race counts as success.
pub async fn ensure(
    registry: &dyn RegistryClient,
    parent: Option<&Address>,
    kind: ResourceKind,
    id: &str,
    body: ResourceBody,
) -> RegistryResult<(Resource, bool)> {
    let name = match parent {
        Some(parent) => parent.child(kind, id),
        None => Address::project(id),
    }
    .map_err(|err| RegistryError::InvalidArgument(err.to_string()))?;

    if let Some(existing) = get_optional(registry, &name).await? {
        return Ok((existing, false));
    }
    match registry.create(parent, kind, id, body).await {
        Ok(created) => Ok((created, true)),
        Err(err) if err.is_already_exists() => Ok((registry.get(&name).await?, false)),
        Err(err) => Err(err),
    }
}

/// Applies a per-call timeout and run-wide cancellation to every call.
#[derive(Clone)]
pub struct GuardedRegistry {
    inner: Arc<dyn RegistryClient>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl GuardedRegistry {
    pub fn new(inner: Arc<dyn RegistryClient>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            inner,
            timeout,
            cancel,
        }
    }

    /// Timeout only. Used for work that must finish once started, such as
    /// recording the result of an action that already ran.
    pub fn timeout_only(inner: Arc<dyn RegistryClient>, timeout: Duration) -> Self {
        Self::new(inner, timeout, CancellationToken::new())
    }

    async fn guard<T, F>(&self, call: F) -> RegistryResult<T>
    where
        F: Future<Output = RegistryResult<T>> + Send,
    {
        if self.cancel.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RegistryError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => {
                result.unwrap_or(Err(RegistryError::Timeout(self.timeout)))
            }
        }
    }
}

#[async_trait]
impl RegistryClient for GuardedRegistry {
    async fn get(&self, name: &Address) -> RegistryResult<Resource> {
        self.guard(self.inner.get(name)).await
    }

    async fn list(&self, pattern: &Pattern, filter: &str, page: PageRequest) -> RegistryResult<Page> {
        self.guard(self.inner.list(pattern, filter, page)).await
    }

    async fn create(
        &self,
        parent: Option<&Address>,
        kind: ResourceKind,
        id: &str,
        body: ResourceBody,
    ) -> RegistryResult<Resource> {
        self.guard(self.inner.create(parent, kind, id, body)).await
    }

    async fn set_artifact(&self, name: &Address, body: ResourceBody) -> RegistryResult<Resource> {
        self.guard(self.inner.set_artifact(name, body)).await
    }

    async fn update_labels(&self, name: &Address, labels: Labels) -> RegistryResult<Resource> {
        self.guard(self.inner.update_labels(name, labels)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_times_out_slow_calls() {
        let memory = Arc::new(InMemoryRegistry::new());
        memory.set_latency(Duration::from_millis(500));
        let guarded = GuardedRegistry::new(
            memory,
            Duration::from_millis(20),
            CancellationToken::new(),
        );

        let err = guarded
            .get(&Address::parse("projects/p").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_guard_honours_cancellation() {
        let memory = Arc::new(InMemoryRegistry::new());
        memory.set_latency(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let guarded = GuardedRegistry::new(memory, Duration::from_secs(30), cancel.clone());

        let call = {
            let guarded = guarded.clone();
            tokio::spawn(async move { guarded.get(&Address::parse("projects/p").unwrap()).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        assert_eq!(call.await.unwrap().unwrap_err(), RegistryError::Cancelled);

        // Later calls fail fast.
        assert_eq!(
            guarded.get(&Address::parse("projects/p").unwrap()).await.unwrap_err(),
            RegistryError::Cancelled
        );
    }

    #[tokio::test]
    async fn test_timeout_only_guard_ignores_cancellation() {
        let memory = Arc::new(InMemoryRegistry::new());
        memory
            .create(None, ResourceKind::Project, "p", ResourceBody::default())
            .await
            .unwrap();
        let guarded = GuardedRegistry::timeout_only(memory, Duration::from_secs(5));
        let project = guarded.get(&Address::parse("projects/p").unwrap()).await.unwrap();
        assert_eq!(project.name.id(), "p");
    }

    #[tokio::test]
    async fn test_ensure_tolerates_existing() {
        let memory = InMemoryRegistry::new();
        let (project, created) = ensure(&memory, None, ResourceKind::Project, "p", ResourceBody::default())
            .await
            .unwrap();
        assert!(created);
        let (again, created) = ensure(&memory, None, ResourceKind::Project, "p", ResourceBody::default())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.name, project.name);
    }

    #[tokio::test]
    async fn test_list_all_follows_pages() {
        let memory = InMemoryRegistry::new();
        let project = Address::project("p").unwrap();
        memory
            .create(None, ResourceKind::Project, "p", ResourceBody::default())
            .await
            .unwrap();
        for i in 0..7 {
            memory
                .create(Some(&project), ResourceKind::Api, &format!("api-{}", i), ResourceBody::default())
                .await
                .unwrap();
        }

        let pattern = Pattern::parse("projects/p/apis/-").unwrap();
        let all = list_all(&memory, &pattern, "", 3).await.unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[0].name.id(), "api-0");
    }
}
