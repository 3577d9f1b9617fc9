use sqleval_core::{ExecutionOutcome, TaskStatus};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Pool counters for monitoring
#[derive(Debug, Default)]
pub struct PoolMetrics {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    timed_out: AtomicUsize,
    failed: AtomicUsize,
    busy_micros: AtomicU64,
}

/// Point-in-time copy of [`PoolMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub submitted: usize,
    pub completed: usize,
    pub timed_out: usize,
    pub failed: usize,
    /// Summed wall-clock time spent inside executors.
    pub busy: Duration,
}

impl PoolMetrics {
    pub fn submitted(&self, count: usize) {
        self.submitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: &ExecutionOutcome, elapsed: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        match outcome.status {
            TaskStatus::Ok => {}
            TaskStatus::TimedOut => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            TaskStatus::RuntimeError => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.busy_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            busy: Duration::from_micros(self.busy_micros.load(Ordering::Relaxed)),
        }
    }
}
