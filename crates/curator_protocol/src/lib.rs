//! Shared vocabulary for the Curator workspace.
//!
//! Resource names and patterns, registry payload types, label mutations,
//! defaults, and operator configuration. Nothing here performs I/O against
//! the registry.

pub mod config;
pub mod defaults;
pub mod labels;
pub mod names;
pub mod paths;
pub mod types;

pub use config::CuratorConfig;
pub use paths::CuratorPaths;
pub use labels::{apply_mutations, LabelError, LabelMutation};
pub use names::{
    is_valid_id, Address, Captures, NameError, Pattern, PatternKind, ResourceKind, Segment,
    WILDCARD,
};
pub use types::{Labels, Page, PageRequest, ResolvedResource, Resource, ResourceBody, Revision};
