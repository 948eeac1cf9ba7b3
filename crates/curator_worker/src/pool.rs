//! Bounded worker pool.
//!
//! A fixed set of tokio workers pull boxed [`Task`]s from one bounded queue.
//!
//! Lifecycle:
//! ```text
//! WorkerPool::new ──> sender()/submit() ──> close() ──> wait() -> PoolReport
//! ```
//!
//! - Submission awaits while the queue is full. That is the only backpressure.
//! - Each task runs in its own spawned tokio task, so a panic is recorded as a
//!   failure and never takes a worker down.
//! - Once the run's [`CancellationToken`] fires, workers stop pulling new
//!   tasks and blocked producers return [`SubmitError::Cancelled`]. Tasks
//!   already dispatched run to completion.
//! - `wait()` returns after every [`TaskSender`] has been dropped and the
//!   workers have drained the queue.

use tokio_util::sync::CancellationToken;
use crate::metrics::{MetricsSnapshot, PoolMetrics};
use crate::task::Task;
use curator_protocol::defaults::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type BoxedTask = Box<dyn Task>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("worker pool is closed")]
    Closed,

    #[error("submission cancelled")]
    Cancelled,
}

/// One failed task and its error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
}

/// Aggregate result of a pool's lifetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolReport {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Tasks still queued when the run was cancelled.
    pub abandoned: u64,
    pub failures: Vec<TaskFailure>,
    pub metrics: MetricsSnapshot,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl PoolReport {
    pub fn succeeded(&self) -> u64 {
        self.created + self.updated
    }

    pub fn attempted(&self) -> u64 {
        self.succeeded() + self.skipped + self.failed
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.abandoned == 0
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}

struct PoolState {
    metrics: PoolMetrics,
    failures: StdMutex<Vec<TaskFailure>>,
}

impl PoolState {
    fn record_failure(&self, task: String, error: String) {
        self.metrics.inc_failed();
        match self.failures.lock() {
            Ok(mut failures) => failures.push(TaskFailure { task, error }),
            Err(poisoned) => poisoned.into_inner().push(TaskFailure { task, error }),
        }
    }

    fn take_failures(&self) -> Vec<TaskFailure> {
        match self.failures.lock() {
            Ok(mut failures) => std::mem::take(&mut *failures),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

/// Cloneable submission handle.
#[derive(Clone)]
pub struct TaskSender {
    tx: mpsc::Sender<BoxedTask>,
    cancel: CancellationToken,
    state: Arc<PoolState>,
}

impl TaskSender {
    /// Queue a task, waiting while the queue is full.
    pub async fn submit(&self, task: BoxedTask) -> Result<(), SubmitError> {
        if self.cancel.is_cancelled() {
            return Err(SubmitError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SubmitError::Cancelled),
            sent = self.tx.send(task) => match sent {
                Ok(()) => {
                    self.state.metrics.inc_submitted();
                    Ok(())
                }
                Err(_) => Err(SubmitError::Closed),
            },
        }
    }
}

pub struct WorkerPool {
    sender: Option<TaskSender>,
    receiver: Arc<Mutex<mpsc::Receiver<BoxedTask>>>,
    workers: Vec<JoinHandle<()>>,
    state: Arc<PoolState>,
    cancel: CancellationToken,
    started_at: Instant,
}

impl WorkerPool {
    /// Spawn `config.workers` workers on the current runtime.
    pub fn new(config: PoolConfig, cancel: CancellationToken) -> Self {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let receiver = Arc::new(Mutex::new(rx));
        let state = Arc::new(PoolState {
            metrics: PoolMetrics::new(),
            failures: StdMutex::new(Vec::new()),
        });

        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&state),
                    cancel.clone(),
                ))
            })
            .collect();

        info!(workers, queue_capacity = capacity, "Worker pool started");

        Self {
            sender: Some(TaskSender {
                tx,
                cancel: cancel.clone(),
                state: Arc::clone(&state),
            }),
            receiver,
            workers: handles,
            state,
            cancel,
            started_at: Instant::now(),
        }
    }

    /// A new submission handle. Fails once the pool is closed.
    pub fn sender(&self) -> Result<TaskSender, SubmitError> {
        self.sender.clone().ok_or(SubmitError::Closed)
    }

    pub async fn submit(&self, task: BoxedTask) -> Result<(), SubmitError> {
        match &self.sender {
            Some(sender) => sender.submit(task).await,
            None => Err(SubmitError::Closed),
        }
    }

    /// Stop accepting work through the pool itself. Outstanding
    /// [`TaskSender`] clones keep the queue open until they are dropped.
    pub fn close(&mut self) {
        if self.sender.take().is_some() {
            debug!("Worker pool closed for submission");
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.metrics.snapshot()
    }

    /// Close, wait for every worker to exit, and aggregate the results.
    pub async fn wait(mut self) -> PoolReport {
        self.close();

        for handle in self.workers.drain(..) {
            if let Err(err) = handle.await {
                warn!(error = %err, "Worker exited abnormally");
            }
        }

        let mut abandoned = 0u64;
        {
            let mut rx = self.receiver.lock().await;
            rx.close();
            while rx.try_recv().is_ok() {
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            warn!(abandoned, "Tasks left in queue after cancellation");
        }

        let snapshot = self.state.metrics.snapshot();
        let report = PoolReport {
            created: snapshot.tasks_created,
            updated: snapshot.tasks_updated,
            skipped: snapshot.tasks_skipped,
            failed: snapshot.tasks_failed,
            abandoned,
            failures: self.state.take_failures(),
            metrics: snapshot,
            elapsed: self.started_at.elapsed(),
        };

        info!(
            cancelled = self.cancel.is_cancelled(),
            "Worker pool finished. {}",
            report.metrics.summary()
        );
        report
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<BoxedTask>>>,
    state: Arc<PoolState>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            debug!(worker = id, "Cancellation requested, worker stopping");
            break;
        }

        let next = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                task = rx.recv() => task,
            }
        };

        let Some(task) = next else {
            break;
        };
        run_task(id, task, &state, &cancel).await;
    }
}

async fn run_task(id: usize, task: BoxedTask, state: &PoolState, cancel: &CancellationToken) {
    let description = task.describe();
    state.metrics.inc_started();
    let start = Instant::now();

    let token = cancel.clone();
    let joined = tokio::spawn(async move { task.run(&token).await }).await;
    state.metrics.record_run_time(start);

    match joined {
        Ok(Ok(outcome)) => {
            state.metrics.record_outcome(outcome);
            debug!(worker = id, task = %description, outcome = %outcome, "Task finished");
        }
        Ok(Err(err)) => {
            let error = format!("{:#}", err);
            warn!(worker = id, task = %description, error = %error, "Task failed");
            state.record_failure(description, error);
        }
        Err(join_err) => {
            let error = if join_err.is_panic() {
                "task panicked".to_string()
            } else {
                join_err.to_string()
            };
            warn!(worker = id, task = %description, error = %error, "Task aborted");
            state.record_failure(description, error);
        }
    }
}
