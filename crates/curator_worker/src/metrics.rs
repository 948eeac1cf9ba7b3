//! Per-pool counters.
//!
//! Lock-free atomics updated by the workers and read through
//! [`PoolMetrics::snapshot`]. Each pool owns its own instance.

use crate::task::TaskOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub tasks_submitted: AtomicU64,
    pub tasks_started: AtomicU64,
    pub tasks_created: AtomicU64,
    pub tasks_updated: AtomicU64,
    pub tasks_skipped: AtomicU64,
    pub tasks_failed: AtomicU64,

    // Cumulative microseconds for averaging
    pub run_time_us: AtomicU64,
}

impl PoolMetrics {
    pub const fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_started: AtomicU64::new(0),
            tasks_created: AtomicU64::new(0),
            tasks_updated: AtomicU64::new(0),
            tasks_skipped: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            run_time_us: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_outcome(&self, outcome: TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Created => &self.tasks_created,
            TaskOutcome::Updated => &self.tasks_updated,
            TaskOutcome::Skipped => &self.tasks_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record task run time in microseconds
    #[inline]
    pub fn record_run_time(&self, start: Instant) {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.run_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_created: self.tasks_created.load(Ordering::Relaxed),
            tasks_updated: self.tasks_updated.load(Ordering::Relaxed),
            tasks_skipped: self.tasks_skipped.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            run_time_us: self.run_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of pool metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_started: u64,
    pub tasks_created: u64,
    pub tasks_updated: u64,
    pub tasks_skipped: u64,
    pub tasks_failed: u64,
    pub run_time_us: u64,
}

impl MetricsSnapshot {
    pub fn tasks_finished(&self) -> u64 {
        self.tasks_created + self.tasks_updated + self.tasks_skipped + self.tasks_failed
    }

    /// Average task run time in milliseconds
    pub fn avg_run_time_ms(&self) -> f64 {
        let finished = self.tasks_finished();
        if finished == 0 {
            0.0
        } else {
            (self.run_time_us as f64 / finished as f64) / 1000.0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Tasks: {} submitted, {} started | {} created, {} updated, {} skipped, {} failed | \
             Avg run: {:.2}ms",
            self.tasks_submitted,
            self.tasks_started,
            self.tasks_created,
            self.tasks_updated,
            self.tasks_skipped,
            self.tasks_failed,
            self.avg_run_time_ms(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = PoolMetrics::new();
        metrics.inc_submitted();
        metrics.inc_submitted();
        metrics.record_outcome(TaskOutcome::Created);
        metrics.record_outcome(TaskOutcome::Skipped);
        metrics.inc_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_submitted, 2);
        assert_eq!(snapshot.tasks_created, 1);
        assert_eq!(snapshot.tasks_skipped, 1);
        assert_eq!(snapshot.tasks_finished(), 3);
    }

    #[test]
    fn test_avg_run_time_without_tasks() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.avg_run_time_ms(), 0.0);
        assert!(snapshot.summary().contains("0 submitted"));
    }
}
