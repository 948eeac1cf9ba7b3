//! Whether a target needs regenerating.

use crate::resolver::Resolution;
use curator_protocol::{Resource, Revision};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Staleness {
    /// Target does not exist yet.
    Missing { latest: Revision },
    /// Some dependency is newer than what the target was generated from.
    Stale { recorded: Revision, latest: Revision },
    UpToDate { recorded: Revision, latest: Revision },
    /// A dependency had no candidates; no task for this target.
    Inapplicable,
}

impl Staleness {
    pub fn evaluate(target: Option<&Resource>, resolution: &Resolution) -> Self {
        if !resolution.is_applicable() {
            return Staleness::Inapplicable;
        }
        let Some(latest) = resolution.max_revision() else {
            return Staleness::Inapplicable;
        };
        match target {
            None => Staleness::Missing { latest },
            Some(existing) => {
                let recorded = existing.recorded_source_revision();
                if recorded < latest {
                    Staleness::Stale { recorded, latest }
                } else {
                    Staleness::UpToDate { recorded, latest }
                }
            }
        }
    }

    pub fn needs_regeneration(&self) -> bool {
        matches!(self, Staleness::Missing { .. } | Staleness::Stale { .. })
    }

    /// Newest dependency revision, the value a regenerated target records.
    pub fn latest(&self) -> Option<Revision> {
        match self {
            Staleness::Missing { latest }
            | Staleness::Stale { latest, .. }
            | Staleness::UpToDate { latest, .. } => Some(*latest),
            Staleness::Inapplicable => None,
        }
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::Missing { .. } => f.write_str("missing"),
            Staleness::Stale { recorded, latest } => {
                write!(f, "stale (generated from {}, sources at {})", recorded, latest)
            }
            Staleness::UpToDate { .. } => f.write_str("up to date"),
            Staleness::Inapplicable => f.write_str("inapplicable"),
        }
    }
}
