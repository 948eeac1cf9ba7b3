//! Bounded-concurrency task execution for Curator.
//!
//! The same pool runs manifest-driven regeneration tasks and bulk ingestion
//! tasks. Pools are explicit values owned by the invocation that creates them.

pub mod metrics;
pub mod pool;
pub mod task;

pub use metrics::{MetricsSnapshot, PoolMetrics};
pub use pool::{PoolConfig, PoolReport, SubmitError, TaskFailure, TaskSender, WorkerPool};
pub use task::{Task, TaskOutcome};
pub use tokio_util::sync::CancellationToken;
