//! Manifest model.
//!
//! [`ManifestDocument`] is the decoded file as written by operators.
//! [`Manifest::from_document`] turns it into validated rules; this is the only
//! place manifests are checked, and any problem rejects the whole manifest
//! before work begins.

use crate::action::ActionTemplate;
use curator_protocol::{is_valid_id, Address, NameError, Pattern, PatternKind, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("invalid manifest{}: {reason}", rule_suffix(.rule))]
    InvalidManifest { rule: Option<usize>, reason: String },
}

fn rule_suffix(rule: &Option<usize>) -> String {
    match rule {
        Some(index) => format!(" (rule {})", index),
        None => String::new(),
    }
}

impl ManifestError {
    fn manifest(reason: impl Into<String>) -> Self {
        ManifestError::InvalidManifest {
            rule: None,
            reason: reason.into(),
        }
    }

    fn rule(index: usize, reason: impl Into<String>) -> Self {
        ManifestError::InvalidManifest {
            rule: Some(index),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Document (serde shape)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default, alias = "manifest")]
    pub rules: Vec<RuleDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyDocument>,
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyDocument {
    #[serde(alias = "pattern")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,
}

// ============================================================================
// Source expressions
// ============================================================================

/// Where a dependency's candidates come from once a target is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Single(Address),
    Many(Pattern),
}

/// `$resource.<relation>[/<collection>/<id-or-->...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceExpression {
    text: String,
    relation: ResourceKind,
    tail: String,
}

const SOURCE_PREFIX: &str = "$resource.";

impl SourceExpression {
    pub fn parse(text: &str) -> Result<Self, String> {
        let trimmed = text.trim();
        let rest = trimmed
            .strip_prefix(SOURCE_PREFIX)
            .ok_or_else(|| format!("source '{}' must start with '{}'", trimmed, SOURCE_PREFIX))?;
        let (relation_name, tail) = rest.split_once('/').unwrap_or((rest, ""));
        let relation = ResourceKind::from_relation(relation_name)
            .ok_or_else(|| format!("unknown relation '{}' in source '{}'", relation_name, trimmed))?;

        if !tail.is_empty() {
            let segments: Vec<&str> = tail.split('/').collect();
            for pair in segments.chunks(2) {
                if ResourceKind::from_collection(pair[0]).is_none() {
                    return Err(format!("unknown collection '{}' in source '{}'", pair[0], trimmed));
                }
                if let Some(id) = pair.get(1) {
                    let id = id.split_once('@').map_or(*id, |(id, _)| id);
                    if id != curator_protocol::WILDCARD && !is_valid_id(id) {
                        return Err(format!("invalid id '{}' in source '{}'", id, trimmed));
                    }
                }
            }
        }

        Ok(Self {
            text: trimmed.to_string(),
            relation,
            tail: tail.to_string(),
        })
    }

    pub fn relation(&self) -> ResourceKind {
        self.relation
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Resolve against a concrete target. `Ok(None)` means the target has no
    /// ancestor of the expression's relation.
    pub fn evaluate(&self, target: &Address) -> Result<Option<SourceRef>, NameError> {
        let Some(anchor) = target.ancestor(self.relation) else {
            return Ok(None);
        };
        if self.tail.is_empty() {
            return Ok(Some(SourceRef::Single(anchor)));
        }
        let text = format!("{}/{}", anchor, self.tail);
        match Address::parse(&text) {
            Ok(address) => Ok(Some(SourceRef::Single(address))),
            Err(_) => Ok(Some(SourceRef::Many(Pattern::parse(&text)?))),
        }
    }

    /// Check the expression's shape against a target pattern.
    fn check_against(&self, target: &Pattern) -> Result<(), String> {
        let Some(anchor) = target.ancestor(self.relation) else {
            return Err(format!(
                "source '{}' names a {} but targets '{}' have none",
                self.text, self.relation, target
            ));
        };
        if !self.tail.is_empty() {
            Pattern::parse(&format!("{}/{}", anchor, self.tail))
                .map_err(|err| format!("source '{}' does not form a valid path: {}", self.text, err))?;
        }
        Ok(())
    }
}

impl fmt::Display for SourceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ============================================================================
// Validated manifest
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub source: SourceExpression,
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Position in the manifest, used in logs and reports.
    pub index: usize,
    pub target: Pattern,
    pub filter: String,
    pub dependencies: Vec<Dependency>,
    pub action: ActionTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub project: String,
    pub rules: Vec<Rule>,
}

impl Manifest {
    pub fn from_document(doc: &ManifestDocument) -> Result<Self, ManifestError> {
        let project = doc.project.trim();
        if project.is_empty() {
            return Err(ManifestError::manifest("missing project"));
        }
        if !is_valid_id(project) {
            return Err(ManifestError::manifest(format!("invalid project id '{}'", project)));
        }

        let rules = doc
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| Self::rule_from_document(project, index, rule))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: doc.name.clone(),
            project: project.to_string(),
            rules,
        })
    }

    fn rule_from_document(project: &str, index: usize, doc: &RuleDocument) -> Result<Rule, ManifestError> {
        let target = Pattern::qualify(project, &doc.resource)
            .map_err(|err| ManifestError::rule(index, err.to_string()))?;
        if !matches!(target.kind(), PatternKind::Resource(_)) {
            return Err(ManifestError::rule(
                index,
                format!("target '{}' must name a single resource, not a collection", target),
            ));
        }

        let mut dependencies = Vec::with_capacity(doc.dependencies.len());
        for dep in &doc.dependencies {
            let source = SourceExpression::parse(&dep.source).map_err(|r| ManifestError::rule(index, r))?;
            source
                .check_against(&target)
                .map_err(|r| ManifestError::rule(index, r))?;
            dependencies.push(Dependency {
                source,
                filter: dep.filter.trim().to_string(),
            });
        }

        let action = ActionTemplate::parse(&doc.action).map_err(|r| ManifestError::rule(index, r))?;
        if let Some(n) = action.source_refs().find(|n| *n >= dependencies.len()) {
            return Err(ManifestError::rule(
                index,
                format!("action refers to $source{} but the rule has {} dependencies", n, dependencies.len()),
            ));
        }
        let captures = target.wildcard_count();
        if let Some(n) = action.capture_refs().find(|n| *n >= captures) {
            return Err(ManifestError::rule(
                index,
                format!("action refers to ${} but '{}' has {} wildcards", n, target, captures),
            ));
        }
        if let Some(kind) = action.relation_refs().find(|k| target.ancestor(*k).is_none()) {
            return Err(ManifestError::rule(
                index,
                format!("action refers to $resource.{} but targets '{}' have none", kind, target),
            ));
        }

        Ok(Rule {
            index,
            target,
            filter: doc.filter.trim().to_string(),
            dependencies,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lint_rule() -> RuleDocument {
        RuleDocument {
            resource: "apis/-/versions/-/specs/-/artifacts/lint-x".to_string(),
            filter: String::new(),
            dependencies: vec![DependencyDocument {
                source: "$resource.spec".to_string(),
                filter: "mime_type contains 'openapi'".to_string(),
            }],
            action: "compute lint $source0 --linter x".to_string(),
        }
    }

    fn doc(rules: Vec<RuleDocument>) -> ManifestDocument {
        ManifestDocument {
            name: "lint".to_string(),
            project: "p".to_string(),
            rules,
        }
    }

    fn rule_error(rule: RuleDocument) -> String {
        match Manifest::from_document(&doc(vec![lint_rule(), rule])) {
            Err(ManifestError::InvalidManifest { rule: Some(1), reason }) => reason,
            other => panic!("expected rule 1 to be rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_manifest() {
        let manifest = Manifest::from_document(&doc(vec![lint_rule()])).unwrap();
        let rule = &manifest.rules[0];
        assert_eq!(rule.target.to_string(), "projects/p/apis/-/versions/-/specs/-/artifacts/lint-x");
        assert_eq!(rule.dependencies[0].source.relation(), ResourceKind::Spec);
        assert_eq!(rule.dependencies[0].filter, "mime_type contains 'openapi'");
    }

    #[test]
    fn test_manifest_alias_and_yaml_shape() {
        let json = r#"{
            "name": "lint",
            "project": "p",
            "manifest": [{
                "resource": "apis/-/versions/-/specs/-/artifacts/lint-x",
                "dependencies": [{"pattern": "$resource.spec"}],
                "action": "compute lint $source0"
            }]
        }"#;
        let parsed: ManifestDocument = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(parsed.rules[0].dependencies[0].source, "$resource.spec");
        Manifest::from_document(&parsed).unwrap();
    }

    #[test]
    fn test_missing_project() {
        let mut d = doc(vec![lint_rule()]);
        d.project = String::new();
        assert!(matches!(
            Manifest::from_document(&d),
            Err(ManifestError::InvalidManifest { rule: None, .. })
        ));
    }

    #[test]
    fn test_rejections_name_the_rule() {
        let mut collection = lint_rule();
        collection.resource = "apis/-/versions".to_string();
        assert!(rule_error(collection).contains("single resource"));

        let mut bad_relation = lint_rule();
        bad_relation.dependencies[0].source = "$resource.organization".to_string();
        assert!(rule_error(bad_relation).contains("unknown relation"));

        let mut not_relative = lint_rule();
        not_relative.dependencies[0].source = "projects/p/apis/a".to_string();
        assert!(rule_error(not_relative).contains("must start with"));

        let mut missing_source = lint_rule();
        missing_source.action = "compute $source1".to_string();
        assert!(rule_error(missing_source).contains("$source1"));

        let mut missing_capture = lint_rule();
        missing_capture.action = "compute $source0 $3".to_string();
        assert!(rule_error(missing_capture).contains("$3"));

        let mut absent_ancestor = lint_rule();
        absent_ancestor.resource = "apis/-/artifacts/summary".to_string();
        assert!(rule_error(absent_ancestor).contains("have none"));

        let mut bad_path = lint_rule();
        bad_path.dependencies[0].source = "$resource.api/specs/-".to_string();
        assert!(rule_error(bad_path).contains("valid path"));
    }

    #[test]
    fn test_source_evaluation() {
        let target = Address::parse("projects/p/apis/a/versions/v/specs/s/artifacts/lint-x").unwrap();

        let spec = SourceExpression::parse("$resource.spec").unwrap();
        assert_eq!(
            spec.evaluate(&target).unwrap(),
            Some(SourceRef::Single(Address::parse("projects/p/apis/a/versions/v/specs/s").unwrap()))
        );

        let siblings = SourceExpression::parse("$resource.version/specs/-").unwrap();
        assert_eq!(
            siblings.evaluate(&target).unwrap(),
            Some(SourceRef::Many(Pattern::parse("projects/p/apis/a/versions/v/specs/-").unwrap()))
        );

        let api_target = Address::parse("projects/p/apis/a/artifacts/summary").unwrap();
        assert_eq!(spec.evaluate(&api_target).unwrap(), None);
    }
}
