//! Registry resource payloads shared by the controller and the CLI.

use crate::defaults::SOURCE_REVISION_ANNOTATION;
use crate::names::{Address, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Freshness marker. Totally ordered; later is newer.
pub type Revision = DateTime<Utc>;

pub type Labels = BTreeMap<String, String>;

/// A stored registry resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: Address,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Labels,
    /// Current revision id of a spec; `None` for every other kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
    pub create_time: Revision,
    pub update_time: Revision,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<u8>,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        self.name.kind()
    }

    /// Revision used when this resource acts as a dependency.
    pub fn revision(&self) -> Revision {
        self.update_time
    }

    /// Source revision this resource was last generated from.
    ///
    /// Reads the source-revision annotation and falls back to the update
    /// time when it is missing or unparseable.
    pub fn recorded_source_revision(&self) -> Revision {
        self.annotations
            .get(SOURCE_REVISION_ANNOTATION)
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or(self.update_time)
    }

    /// Address including the `@revision` suffix, when this is a spec.
    pub fn revision_address(&self) -> Address {
        match (&self.revision_id, self.kind()) {
            (Some(rev), ResourceKind::Spec) => {
                let text = format!("{}@{}", self.name.without_revision(), rev);
                Address::parse(&text).unwrap_or_else(|_| self.name.clone())
            }
            _ => self.name.clone(),
        }
    }

    pub fn metadata(&self) -> ResolvedResource {
        ResolvedResource::from(self)
    }
}

/// Fields supplied when creating or replacing a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceBody {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
    #[serde(default)]
    pub contents: Vec<u8>,
}

impl ResourceBody {
    pub fn with_contents(mime_type: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            contents,
            ..Self::default()
        }
    }
}

/// Read-only snapshot of a dependency candidate, as seen by filters and the
/// staleness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedResource {
    pub address: Address,
    pub mime_type: String,
    pub labels: Labels,
    pub revision: Revision,
}

impl From<&Resource> for ResolvedResource {
    fn from(resource: &Resource) -> Self {
        Self {
            address: resource.name.clone(),
            mime_type: resource.mime_type.clone(),
            labels: resource.labels.clone(),
            revision: resource.revision(),
        }
    }
}

/// Pagination input for list calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_size: usize,
    pub page_token: Option<String>,
}

impl PageRequest {
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size,
            page_token: None,
        }
    }

    pub fn next(&self, token: String) -> Self {
        Self {
            page_size: self.page_size,
            page_token: Some(token),
        }
    }
}

/// One page of list results. `next_page_token` is `None` on the last page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Resource>,
    pub next_page_token: Option<String>,
}
