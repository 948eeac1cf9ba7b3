use anyhow::{bail, Result};
use async_trait::async_trait;
use curator_worker::{
    CancellationToken, PoolConfig, SubmitError, Task, TaskOutcome, WorkerPool,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

/// Succeeds, fails or panics depending on its index.
struct NumberedTask {
    index: usize,
    ran: Arc<AtomicUsize>,
}

#[async_trait]
impl Task for NumberedTask {
    fn describe(&self) -> String {
        format!("task-{}", self.index)
    }

    async fn run(&self, _cancel: &CancellationToken) -> Result<TaskOutcome> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        match self.index % 10 {
            0 => bail!("task {} refused", self.index),
            7 => panic!("task {} exploded", self.index),
            3 => Ok(TaskOutcome::Skipped),
            5 => Ok(TaskOutcome::Updated),
            _ => Ok(TaskOutcome::Created),
        }
    }
}

/// Blocks until its gate is opened.
struct GatedTask {
    name: &'static str,
    gate: Arc<Notify>,
}

#[async_trait]
impl Task for GatedTask {
    fn describe(&self) -> String {
        self.name.to_string()
    }

    async fn run(&self, _cancel: &CancellationToken) -> Result<TaskOutcome> {
        self.gate.notified().await;
        Ok(TaskOutcome::Created)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thousand_tasks_on_32_workers_all_accounted_for() -> Result<()> {
    let ran = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::new(PoolConfig::default(), CancellationToken::new());

    for index in 0..1000 {
        pool.submit(Box::new(NumberedTask {
            index,
            ran: Arc::clone(&ran),
        }))
        .await?;
    }

    let report = timeout(Duration::from_secs(30), pool.wait()).await?;

    assert_eq!(ran.load(Ordering::SeqCst), 1000);
    assert_eq!(report.succeeded() + report.skipped + report.failed, 1000);
    assert_eq!(report.failed, 200);
    assert_eq!(report.skipped, 100);
    assert_eq!(report.updated, 100);
    assert_eq!(report.created, 600);
    assert_eq!(report.failures.len(), 200);
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.metrics.tasks_submitted, 1000);
    Ok(())
}

#[tokio::test]
async fn failure_text_is_reported() -> Result<()> {
    let ran = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::new(
        PoolConfig {
            workers: 2,
            queue_capacity: 4,
        },
        CancellationToken::new(),
    );

    for index in [0, 7, 1] {
        pool.submit(Box::new(NumberedTask {
            index,
            ran: Arc::clone(&ran),
        }))
        .await?;
    }
    let report = pool.wait().await;

    assert_eq!(report.created, 1);
    assert_eq!(report.failed, 2);
    let mut failures: Vec<_> = report
        .failures
        .iter()
        .map(|f| (f.task.as_str(), f.error.as_str()))
        .collect();
    failures.sort();
    assert_eq!(
        failures,
        [("task-0", "task 0 refused"), ("task-7", "task panicked")]
    );
    Ok(())
}

#[tokio::test]
async fn full_queue_blocks_until_cancelled() -> Result<()> {
    let cancel = CancellationToken::new();
    let gate = Arc::new(Notify::new());
    let pool = WorkerPool::new(
        PoolConfig {
            workers: 1,
            queue_capacity: 1,
        },
        cancel.clone(),
    );
    let sender = pool.sender()?;

    // First task occupies the only worker, second fills the queue.
    sender
        .submit(Box::new(GatedTask { name: "first", gate: Arc::clone(&gate) }))
        .await?;
    sender
        .submit(Box::new(GatedTask { name: "second", gate: Arc::clone(&gate) }))
        .await?;

    let blocked = timeout(
        Duration::from_millis(100),
        sender.submit(Box::new(GatedTask { name: "third", gate: Arc::clone(&gate) })),
    )
    .await;
    assert!(blocked.is_err(), "submission should wait on a full queue");

    let producer = {
        let sender = sender.clone();
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            sender
                .submit(Box::new(GatedTask { name: "fourth", gate }))
                .await
        })
    };
    tokio::task::yield_now().await;
    cancel.cancel();
    assert_eq!(producer.await?, Err(SubmitError::Cancelled));

    // Release the task already running; the queued one is never started.
    gate.notify_one();
    drop(sender);
    let report = timeout(Duration::from_secs(5), pool.wait()).await?;

    assert_eq!(report.created, 1);
    assert_eq!(report.abandoned, 1);
    assert!(!report.is_clean());
    Ok(())
}

#[tokio::test]
async fn submit_after_close_is_rejected() -> Result<()> {
    let mut pool = WorkerPool::new(
        PoolConfig {
            workers: 1,
            queue_capacity: 1,
        },
        CancellationToken::new(),
    );
    pool.close();

    let ran = Arc::new(AtomicUsize::new(0));
    let result = pool
        .submit(Box::new(NumberedTask { index: 1, ran }))
        .await;
    assert_eq!(result, Err(SubmitError::Closed));
    assert!(matches!(pool.sender(), Err(SubmitError::Closed)));

    let report = pool.wait().await;
    assert_eq!(report.attempted(), 0);
    Ok(())
}
