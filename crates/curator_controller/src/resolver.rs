//! Dependency resolution for one (rule, target) pair.

use crate::manifest::{Rule, SourceRef};
use crate::predicate::Predicate;
use crate::registry::{list_all, RegistryClient, RegistryError};
use curator_protocol::{Address, ResolvedResource, Resource, Revision};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("dependency {index} ('{expression}') cannot be resolved for {target}: {reason}")]
    DependencyUnresolved {
        index: usize,
        expression: String,
        target: Address,
        reason: String,
    },

    #[error("registry error resolving dependency {index} for {target}: {error}")]
    Registry {
        index: usize,
        target: Address,
        error: RegistryError,
    },
}

/// Candidates per dependency, index-aligned with the rule's dependencies and
/// sorted by address. Resolution stops at the first dependency with no
/// candidates, so an inapplicable resolution may be shorter than the rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    dependencies: Vec<Vec<ResolvedResource>>,
    expected: usize,
}

impl Resolution {
    pub fn new(dependencies: Vec<Vec<ResolvedResource>>) -> Self {
        let expected = dependencies.len();
        Self {
            dependencies,
            expected,
        }
    }

    /// At least one dependency, and every dependency produced a candidate.
    pub fn is_applicable(&self) -> bool {
        self.expected > 0
            && self.dependencies.len() == self.expected
            && self.dependencies.iter().all(|d| !d.is_empty())
    }

    pub fn dependency(&self, index: usize) -> Option<&[ResolvedResource]> {
        self.dependencies.get(index).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Newest revision across every candidate.
    pub fn max_revision(&self) -> Option<Revision> {
        self.dependencies.iter().flatten().map(|r| r.revision).max()
    }
}

pub struct Resolver<'a> {
    registry: &'a dyn RegistryClient,
    predicate: &'a dyn Predicate,
    page_size: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a dyn RegistryClient, predicate: &'a dyn Predicate, page_size: usize) -> Self {
        Self {
            registry,
            predicate,
            page_size,
        }
    }

    pub async fn resolve(&self, rule: &Rule, target: &Address) -> Result<Resolution, ResolveError> {
        let mut dependencies = Vec::with_capacity(rule.dependencies.len());

        for (index, dependency) in rule.dependencies.iter().enumerate() {
            let unresolved = |reason: String| ResolveError::DependencyUnresolved {
                index,
                expression: dependency.source.to_string(),
                target: target.clone(),
                reason,
            };
            let registry_error = |error: RegistryError| ResolveError::Registry {
                index,
                target: target.clone(),
                error,
            };

            let source = match dependency.source.evaluate(target) {
                Ok(Some(source)) => source,
                Ok(None) => {
                    return Err(unresolved(format!(
                        "target has no {}",
                        dependency.source.relation()
                    )))
                }
                Err(err) => return Err(unresolved(err.to_string())),
            };

            let fetched: Vec<Resource> = match &source {
                SourceRef::Single(address) => match self.registry.get(address).await {
                    Ok(resource) => vec![resource],
                    Err(err) if err.is_not_found() => {
                        debug!(rule = rule.index, target = %target, source = %address, "Dependency not found");
                        Vec::new()
                    }
                    Err(err) => return Err(registry_error(err)),
                },
                SourceRef::Many(pattern) => list_all(self.registry, pattern, "", self.page_size)
                    .await
                    .map_err(registry_error)?,
            };

            let mut candidates: Vec<ResolvedResource> = fetched
                .iter()
                .map(ResolvedResource::from)
                .filter(|candidate| self.passes(&dependency.filter, candidate))
                .collect();
            candidates.sort_by(|a, b| a.address.cmp(&b.address));

            if candidates.is_empty() {
                debug!(
                    rule = rule.index,
                    target = %target,
                    dependency = index,
                    "No candidates; rule does not apply to target"
                );
                return Ok(Resolution {
                    dependencies,
                    expected: rule.dependencies.len(),
                });
            }
            dependencies.push(candidates);
        }

        Ok(Resolution::new(dependencies))
    }

    fn passes(&self, filter: &str, candidate: &ResolvedResource) -> bool {
        match self.predicate.evaluate(filter, candidate) {
            Ok(pass) => pass,
            Err(err) => {
                warn!(candidate = %candidate.address, error = %err, "Filter evaluation failed; excluding candidate");
                false
            }
        }
    }
}
