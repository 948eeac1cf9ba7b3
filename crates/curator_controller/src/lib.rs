//! Manifest-driven regeneration of derived registry artifacts.
//!
//! ```text
//! Manifest ──> enumerate targets ──> resolve dependencies ──> staleness
//!                                                               │
//!                          WorkerPool <── RegenerateTask <── render action
//! ```
//!
//! The registry, filter evaluation, and action execution are reached only
//! through the [`RegistryClient`], [`Predicate`], and [`ActionRunner`] traits.

pub mod action;
pub mod controller;
pub mod manifest;
pub mod predicate;
pub mod registry;
pub mod resolver;
pub mod staleness;
pub mod targets;
pub mod task;

pub use action::{ActionError, ActionRunner, ActionTemplate, CommandRunner, DryRunRunner, RenderedAction};
pub use controller::{Controller, ControllerConfig, ControllerError, Plan, PlannedTask, RunReport, TargetFailure};
pub use manifest::{Manifest, ManifestDocument, ManifestError, Rule};
pub use predicate::{BasicPredicate, Predicate, PredicateError};
pub use registry::{GuardedRegistry, InMemoryRegistry, RegistryClient, RegistryError};
pub use resolver::{Resolution, ResolveError, Resolver};
pub use staleness::Staleness;
pub use task::RegenerateTask;
