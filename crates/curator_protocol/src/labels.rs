//! Label mutation arguments (`key=value`, `key-`).

use crate::types::Labels;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("invalid label argument '{0}': expected key=value or key-")]
    Malformed(String),

    #[error("invalid label key '{0}'")]
    InvalidKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelMutation {
    Set { key: String, value: String },
    Remove { key: String },
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}

impl LabelMutation {
    pub fn parse(arg: &str) -> Result<Self, LabelError> {
        if let Some((key, value)) = arg.split_once('=') {
            if !valid_key(key) {
                return Err(LabelError::InvalidKey(key.to_string()));
            }
            return Ok(LabelMutation::Set {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        if let Some(key) = arg.strip_suffix('-') {
            if !valid_key(key) {
                return Err(LabelError::InvalidKey(key.to_string()));
            }
            return Ok(LabelMutation::Remove {
                key: key.to_string(),
            });
        }
        Err(LabelError::Malformed(arg.to_string()))
    }

    pub fn key(&self) -> &str {
        match self {
            LabelMutation::Set { key, .. } | LabelMutation::Remove { key } => key,
        }
    }
}

impl FromStr for LabelMutation {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelMutation::Set { key, value } => write!(f, "{}={}", key, value),
            LabelMutation::Remove { key } => write!(f, "{}-", key),
        }
    }
}

/// Apply mutations in order and return whether anything changed.
///
/// Without `overwrite`, a `Set` on a key that already holds a different value
/// is ignored. New keys and removals always apply. The check is made against
/// the labels as they stand when each mutation is reached, so a later
/// mutation of the same key sees the earlier one's result.
pub fn apply_mutations(labels: &mut Labels, mutations: &[LabelMutation], overwrite: bool) -> bool {
    let mut changed = false;
    for mutation in mutations {
        match mutation {
            LabelMutation::Set { key, value } => match labels.get(key) {
                Some(current) if current == value => {}
                Some(_) if !overwrite => {
                    tracing::debug!(key = %key, "ignoring label change without overwrite");
                }
                _ => {
                    labels.insert(key.clone(), value.clone());
                    changed = true;
                }
            },
            LabelMutation::Remove { key } => {
                changed |= labels.remove(key).is_some();
            }
        }
    }
    changed
}
