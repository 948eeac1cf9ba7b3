//! Hierarchical resource names.
//!
//! Every registry resource has an address of alternating collection and ID
//! segments:
//!
//! ```text
//! projects/<id>[/apis/<id>[/versions/<id>[/specs/<id>[@<revision>]]]][/artifacts/<id>]
//! ```
//!
//! Artifacts may hang off any resource except another artifact. A path that
//! ends in a bare collection name (`projects/p/apis`) is a listing scope.
//!
//! [`Address`] is a concrete name. [`Pattern`] is the same shape where any ID
//! may be the wildcard `-`. Matching is structural: a wildcard stands for
//! exactly one ID at its own level and binds a positional capture, so
//! `projects/-/apis` can never match `projects/a/b/apis`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reserved ID token that matches any single ID.
pub const WILDCARD: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("pattern '{pattern}' has {expected} wildcard(s) but {actual} capture(s) were supplied")]
    CaptureMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
    },

    #[error("pattern '{0}' denotes a collection, not a single resource")]
    NotAResource(String),
}

/// The resource kinds of the registry hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Project,
    Api,
    Version,
    Spec,
    Artifact,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Project,
        ResourceKind::Api,
        ResourceKind::Version,
        ResourceKind::Spec,
        ResourceKind::Artifact,
    ];

    /// Singular name, as used in `$resource.<relation>` expressions.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Project => "project",
            ResourceKind::Api => "api",
            ResourceKind::Version => "version",
            ResourceKind::Spec => "spec",
            ResourceKind::Artifact => "artifact",
        }
    }

    /// Collection segment that precedes IDs of this kind.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Project => "projects",
            ResourceKind::Api => "apis",
            ResourceKind::Version => "versions",
            ResourceKind::Spec => "specs",
            ResourceKind::Artifact => "artifacts",
        }
    }

    pub fn from_collection(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == segment)
    }

    pub fn from_relation(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Whether a resource of this kind may be a direct child of `parent`
    /// (`None` meaning the root).
    pub fn allowed_under(self, parent: Option<ResourceKind>) -> bool {
        match (self, parent) {
            (ResourceKind::Project, None) => true,
            (ResourceKind::Api, Some(ResourceKind::Project)) => true,
            (ResourceKind::Version, Some(ResourceKind::Api)) => true,
            (ResourceKind::Spec, Some(ResourceKind::Version)) => true,
            (ResourceKind::Artifact, Some(p)) => p != ResourceKind::Artifact,
            _ => false,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if `id` satisfies the identifier grammar.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != WILDCARD
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
}

// ============================================================================
// Tokenizer shared by Address and Pattern
// ============================================================================

struct RawPart<'a> {
    kind: ResourceKind,
    id: &'a str,
    revision: Option<&'a str>,
}

struct RawName<'a> {
    parts: Vec<RawPart<'a>>,
    listing: Option<ResourceKind>,
}

fn split_name(text: &str) -> Result<RawName<'_>, String> {
    if text.is_empty() {
        return Err("name is empty".to_string());
    }

    let tokens: Vec<&str> = text.split('/').collect();
    let mut parts: Vec<RawPart<'_>> = Vec::new();
    let mut listing = None;
    let mut i = 0;

    while i < tokens.len() {
        let collection = tokens[i];
        let kind = ResourceKind::from_collection(collection)
            .ok_or_else(|| format!("unknown collection '{}'", collection))?;

        let parent = parts.last().map(|p| p.kind);
        if !kind.allowed_under(parent) {
            return Err(match parent {
                Some(p) => format!("'{}' cannot appear under a {}", collection, p),
                None => format!("'{}' cannot appear at the root", collection),
            });
        }

        match tokens.get(i + 1) {
            None => {
                listing = Some(kind);
                i += 1;
            }
            Some(token) => {
                let (id, revision) = match (kind, token.split_once('@')) {
                    (ResourceKind::Spec, Some((id, rev))) => (id, Some(rev)),
                    _ => (*token, None),
                };
                parts.push(RawPart { kind, id, revision });
                i += 2;
            }
        }
    }

    Ok(RawName { parts, listing })
}

fn check_segment(value: &str, what: &str) -> Result<(), String> {
    if value == WILDCARD || is_valid_id(value) {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid {}", value, what))
    }
}

// ============================================================================
// Address
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressPart {
    pub kind: ResourceKind,
    pub id: String,
    pub revision: Option<String>,
}

/// A concrete resource name. Always has at least one part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    parts: Vec<AddressPart>,
}

impl Address {
    pub fn parse(text: &str) -> Result<Self, NameError> {
        let invalid = |reason: String| NameError::InvalidAddress {
            address: text.to_string(),
            reason,
        };

        let raw = split_name(text).map_err(invalid)?;
        if let Some(kind) = raw.listing {
            return Err(invalid(format!(
                "ends in the '{}' collection; an address names a single resource",
                kind.collection()
            )));
        }

        let mut parts = Vec::with_capacity(raw.parts.len());
        for part in raw.parts {
            if part.id == WILDCARD {
                return Err(invalid("wildcards are not allowed in an address".to_string()));
            }
            if !is_valid_id(part.id) {
                return Err(invalid(format!("'{}' is not a valid {} id", part.id, part.kind)));
            }
            if let Some(rev) = part.revision {
                if !is_valid_id(rev) {
                    return Err(invalid(format!("'{}' is not a valid revision", rev)));
                }
            }
            parts.push(AddressPart {
                kind: part.kind,
                id: part.id.to_string(),
                revision: part.revision.map(str::to_string),
            });
        }

        Ok(Self { parts })
    }

    /// Address of a project.
    pub fn project(id: &str) -> Result<Self, NameError> {
        Self::parse(&format!("projects/{}", id))
    }

    pub fn parts(&self) -> &[AddressPart] {
        &self.parts
    }

    fn last(&self) -> &AddressPart {
        // parse() and child() never produce an empty address
        &self.parts[self.parts.len() - 1]
    }

    pub fn kind(&self) -> ResourceKind {
        self.last().kind
    }

    pub fn id(&self) -> &str {
        &self.last().id
    }

    pub fn revision(&self) -> Option<&str> {
        self.last().revision.as_deref()
    }

    /// ID of the ancestor (or self) of the given kind.
    pub fn component(&self, kind: ResourceKind) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.kind == kind)
            .map(|p| p.id.as_str())
    }

    pub fn project_id(&self) -> &str {
        &self.parts[0].id
    }

    pub fn parent(&self) -> Option<Address> {
        if self.parts.len() < 2 {
            return None;
        }
        Some(Self {
            parts: self.parts[..self.parts.len() - 1].to_vec(),
        })
    }

    /// The resource of `kind` on this address's chain, including itself.
    pub fn ancestor(&self, kind: ResourceKind) -> Option<Address> {
        let idx = self.parts.iter().position(|p| p.kind == kind)?;
        Some(Self {
            parts: self.parts[..=idx].to_vec(),
        })
    }

    pub fn child(&self, kind: ResourceKind, id: &str) -> Result<Address, NameError> {
        let candidate = format!("{}/{}/{}", self, kind.collection(), id);
        if !kind.allowed_under(Some(self.kind())) {
            return Err(NameError::InvalidAddress {
                address: candidate,
                reason: format!("a {} cannot contain a {}", self.kind(), kind),
            });
        }
        if !is_valid_id(id) {
            return Err(NameError::InvalidAddress {
                address: candidate,
                reason: format!("'{}' is not a valid {} id", id, kind),
            });
        }
        let mut parts = self.parts.clone();
        parts.push(AddressPart {
            kind,
            id: id.to_string(),
            revision: None,
        });
        Ok(Self { parts })
    }

    /// Same address with any spec revision suffix removed.
    pub fn without_revision(&self) -> Address {
        Self {
            parts: self
                .parts
                .iter()
                .map(|p| AddressPart {
                    revision: None,
                    ..p.clone()
                })
                .collect(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}/{}", part.kind.collection(), part.id)?;
            if let Some(rev) = &part.revision {
                write!(f, "@{}", rev)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Address::parse(&text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Pattern
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Wildcard,
    Id(String),
}

impl Segment {
    fn from_raw(raw: &str) -> Self {
        if raw == WILDCARD {
            Segment::Wildcard
        } else {
            Segment::Id(raw.to_string())
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Segment::Wildcard)
    }

    fn as_str(&self) -> &str {
        match self {
            Segment::Wildcard => WILDCARD,
            Segment::Id(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternPart {
    pub kind: ResourceKind,
    pub id: Segment,
    /// `None` matches any revision of a spec.
    pub revision: Option<Segment>,
}

/// What a pattern denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Individual resources of this kind.
    Resource(ResourceKind),
    /// Members of a collection of this kind.
    Collection(ResourceKind),
}

/// Positional wildcard captures, in left-to-right order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Captures(Vec<String>);

impl Captures {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for Captures {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    parts: Vec<PatternPart>,
    listing: Option<ResourceKind>,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Self, NameError> {
        let invalid = |reason: String| NameError::InvalidPattern {
            pattern: text.to_string(),
            reason,
        };

        let raw = split_name(text).map_err(invalid)?;
        let mut parts = Vec::with_capacity(raw.parts.len());
        for part in raw.parts {
            check_segment(part.id, &format!("{} id", part.kind)).map_err(invalid)?;
            if let Some(rev) = part.revision {
                check_segment(rev, "revision").map_err(invalid)?;
            }
            parts.push(PatternPart {
                kind: part.kind,
                id: Segment::from_raw(part.id),
                revision: part.revision.map(Segment::from_raw),
            });
        }

        Ok(Self {
            parts,
            listing: raw.listing,
        })
    }

    /// Parse a pattern that may omit its `projects/<id>/` prefix, supplying
    /// `project` when it does.
    pub fn qualify(project: &str, text: &str) -> Result<Self, NameError> {
        let trimmed = text.trim().trim_start_matches('/');
        if trimmed == "projects" || trimmed.starts_with("projects/") {
            Self::parse(trimmed)
        } else {
            Self::parse(&format!("projects/{}/{}", project, trimmed))
        }
    }

    pub fn kind(&self) -> PatternKind {
        match (self.listing, self.parts.last()) {
            (Some(kind), _) => PatternKind::Collection(kind),
            (None, Some(part)) => PatternKind::Resource(part.kind),
            // split_name always yields a part or a listing
            (None, None) => PatternKind::Collection(ResourceKind::Project),
        }
    }

    pub fn parts(&self) -> &[PatternPart] {
        &self.parts
    }

    pub fn last(&self) -> Option<&PatternPart> {
        self.parts.last()
    }

    pub fn wildcard_count(&self) -> usize {
        self.parts
            .iter()
            .map(|p| {
                usize::from(p.id.is_wildcard())
                    + usize::from(p.revision.as_ref().is_some_and(Segment::is_wildcard))
            })
            .sum()
    }

    /// Pattern for the parent of whatever this pattern denotes: the resource
    /// pattern minus its last part, or a collection pattern's owner.
    pub fn parent(&self) -> Option<Pattern> {
        if self.listing.is_some() {
            if self.parts.is_empty() {
                return None;
            }
            return Some(Self {
                parts: self.parts.clone(),
                listing: None,
            });
        }
        if self.parts.len() < 2 {
            return None;
        }
        Some(Self {
            parts: self.parts[..self.parts.len() - 1].to_vec(),
            listing: None,
        })
    }

    /// Prefix of this pattern ending at the part of `kind`.
    pub fn ancestor(&self, kind: ResourceKind) -> Option<Pattern> {
        let idx = self.parts.iter().position(|p| p.kind == kind)?;
        Some(Self {
            parts: self.parts[..=idx].to_vec(),
            listing: None,
        })
    }

    /// True when the final resource segment (ID or revision) is a wildcard,
    /// so only existing resources can match it.
    pub fn ends_in_wildcard(&self) -> bool {
        match self.parts.last() {
            Some(part) if self.listing.is_none() => {
                part.id.is_wildcard() || part.revision.as_ref().is_some_and(Segment::is_wildcard)
            }
            _ => true,
        }
    }

    /// Match a concrete address, returning the wildcard captures.
    ///
    /// A resource pattern matches addresses of the same shape. A collection
    /// pattern matches the direct members of that collection.
    pub fn matches(&self, address: &Address) -> Option<Captures> {
        let expected_len = self.parts.len() + usize::from(self.listing.is_some());
        if address.parts().len() != expected_len {
            return None;
        }
        if let Some(kind) = self.listing {
            if address.kind() != kind {
                return None;
            }
        }

        let mut captures = Vec::new();
        for (pat, part) in self.parts.iter().zip(address.parts()) {
            if pat.kind != part.kind {
                return None;
            }
            match &pat.id {
                Segment::Wildcard => captures.push(part.id.clone()),
                Segment::Id(id) if *id == part.id => {}
                Segment::Id(_) => return None,
            }
            match (&pat.revision, &part.revision) {
                (None, _) => {}
                (Some(Segment::Wildcard), Some(rev)) => captures.push(rev.clone()),
                (Some(Segment::Id(want)), Some(rev)) if want == rev => {}
                _ => return None,
            }
        }

        Some(Captures(captures))
    }

    /// Match text, treating anything that isn't a valid address as a miss.
    pub fn matches_str(&self, text: &str) -> Option<Captures> {
        let address = Address::parse(text).ok()?;
        self.matches(&address)
    }

    /// Substitute captures for wildcards, left to right.
    pub fn render(&self, captures: &Captures) -> Result<Address, NameError> {
        if self.listing.is_some() {
            return Err(NameError::NotAResource(self.to_string()));
        }
        let expected = self.wildcard_count();
        if captures.len() != expected {
            return Err(NameError::CaptureMismatch {
                pattern: self.to_string(),
                expected,
                actual: captures.len(),
            });
        }

        let mut values = captures.as_slice().iter();
        let mut rendered = String::new();
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                rendered.push('/');
            }
            rendered.push_str(part.kind.collection());
            rendered.push('/');
            match &part.id {
                Segment::Wildcard => rendered.push_str(values.next().map_or("", String::as_str)),
                Segment::Id(id) => rendered.push_str(id),
            }
            match &part.revision {
                Some(Segment::Wildcard) => {
                    rendered.push('@');
                    rendered.push_str(values.next().map_or("", String::as_str));
                }
                Some(Segment::Id(rev)) => {
                    rendered.push('@');
                    rendered.push_str(rev);
                }
                None => {}
            }
        }

        Address::parse(&rendered)
    }
}

impl From<&Address> for Pattern {
    fn from(address: &Address) -> Self {
        Self {
            parts: address
                .parts()
                .iter()
                .map(|p| PatternPart {
                    kind: p.kind,
                    id: Segment::Id(p.id.clone()),
                    revision: p.revision.clone().map(Segment::Id),
                })
                .collect(),
            listing: None,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}/{}", part.kind.collection(), part.id.as_str())?;
            if let Some(rev) = &part.revision {
                write!(f, "@{}", rev.as_str())?;
            }
        }
        if let Some(kind) = self.listing {
            if !self.parts.is_empty() {
                f.write_str("/")?;
            }
            f.write_str(kind.collection())?;
        }
        Ok(())
    }
}

impl FromStr for Pattern {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
