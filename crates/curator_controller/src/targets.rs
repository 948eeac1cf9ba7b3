//! Target enumeration for a rule.
//!
//! A target pattern ending in a wildcard can only match resources that
//! already exist, so the pattern itself is listed. A pattern ending in a
//! concrete ID names something that may not exist yet; its parent pattern is
//! listed instead and the target is synthesised under every parent found.

use crate::manifest::Rule;
use crate::registry::{list_all, RegistryResult, RegistryClient};
use curator_protocol::{Address, Captures, Resource};
use tracing::{debug, warn};

/// What enumeration already knows about a target's current state.
#[derive(Debug, Clone, PartialEq)]
pub enum Existing {
    /// The target came back from a listing.
    Listed(Resource),
    /// The target was synthesised; look it up before deciding.
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub address: Address,
    pub captures: Captures,
    pub existing: Existing,
}

pub async fn enumerate_targets(
    registry: &dyn RegistryClient,
    rule: &Rule,
    page_size: usize,
) -> RegistryResult<Vec<Target>> {
    let pattern = &rule.target;

    if pattern.ends_in_wildcard() {
        let listed = list_all(registry, pattern, &rule.filter, page_size).await?;
        let targets: Vec<Target> = listed
            .into_iter()
            .filter_map(|resource| {
                let captures = pattern.matches(&resource.revision_address())?;
                Some(Target {
                    address: resource.name.clone(),
                    captures,
                    existing: Existing::Listed(resource),
                })
            })
            .collect();
        debug!(rule = rule.index, pattern = %pattern, count = targets.len(), "Enumerated existing targets");
        return Ok(targets);
    }

    let Some(parent) = pattern.parent() else {
        // A concrete project target has no parent to list.
        return Ok(match pattern.render(&Captures::default()) {
            Ok(address) => vec![Target {
                address,
                captures: Captures::default(),
                existing: Existing::Unknown,
            }],
            Err(err) => {
                warn!(rule = rule.index, pattern = %pattern, error = %err, "Cannot form target");
                Vec::new()
            }
        });
    };

    let parents = list_all(registry, &parent, &rule.filter, page_size).await?;
    let mut targets = Vec::with_capacity(parents.len());
    for resource in parents {
        let Some(captures) = parent.matches(&resource.revision_address()) else {
            continue;
        };
        match pattern.render(&captures) {
            Ok(address) => targets.push(Target {
                address,
                captures,
                existing: Existing::Unknown,
            }),
            Err(err) => {
                warn!(rule = rule.index, parent = %resource.name, error = %err, "Cannot form target");
            }
        }
    }
    debug!(rule = rule.index, pattern = %pattern, count = targets.len(), "Enumerated targets under parents");
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DependencyDocument, Manifest, ManifestDocument, RuleDocument};
    use crate::registry::InMemoryRegistry;
    use curator_protocol::{ResourceBody, ResourceKind};

    fn rule(resource: &str, filter: &str) -> Rule {
        let doc = ManifestDocument {
            name: "m".to_string(),
            project: "p".to_string(),
            rules: vec![RuleDocument {
                resource: resource.to_string(),
                filter: filter.to_string(),
                dependencies: vec![DependencyDocument {
                    source: "$resource.api".to_string(),
                    filter: String::new(),
                }],
                action: "compute $source0".to_string(),
            }],
        };
        Manifest::from_document(&doc).unwrap().rules.remove(0)
    }

    async fn seeded() -> InMemoryRegistry {
        let registry = InMemoryRegistry::new();
        let project = Address::project("p").unwrap();
        registry
            .create(None, ResourceKind::Project, "p", ResourceBody::default())
            .await
            .unwrap();
        for id in ["a", "b"] {
            let mut body = ResourceBody::default();
            body.labels.insert("team".to_string(), id.to_string());
            registry
                .create(Some(&project), ResourceKind::Api, id, body)
                .await
                .unwrap();
        }
        let a = Address::parse("projects/p/apis/a").unwrap();
        registry
            .create(Some(&a), ResourceKind::Artifact, "summary", ResourceBody::default())
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_wildcard_tail_lists_existing_only() {
        let registry = seeded().await;
        let targets = enumerate_targets(&registry, &rule("apis/-/artifacts/-", ""), 10)
            .await
            .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].address.to_string(), "projects/p/apis/a/artifacts/summary");
        assert_eq!(targets[0].captures.as_slice(), ["a", "summary"]);
        assert!(matches!(targets[0].existing, Existing::Listed(_)));
    }

    #[tokio::test]
    async fn test_concrete_tail_synthesises_under_each_parent() {
        let registry = seeded().await;
        let targets = enumerate_targets(&registry, &rule("apis/-/artifacts/summary", ""), 1)
            .await
            .unwrap();
        let names: Vec<String> = targets.iter().map(|t| t.address.to_string()).collect();
        assert_eq!(
            names,
            ["projects/p/apis/a/artifacts/summary", "projects/p/apis/b/artifacts/summary"]
        );
        assert!(targets.iter().all(|t| t.existing == Existing::Unknown));
    }

    #[tokio::test]
    async fn test_rule_filter_applies_to_listing() {
        let registry = seeded().await;
        let targets = enumerate_targets(&registry, &rule("apis/-/artifacts/summary", "labels.team == 'b'"), 10)
            .await
            .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].captures.as_slice(), ["b"]);
    }
}
