//! Bounded pool of isolated execution units.

mod executor;
mod metrics;

pub use executor::{ProcessExecutor, TaskExecutor, ThreadExecutor};
pub use metrics::{PoolMetrics, PoolSnapshot};

use futures::FutureExt;
use sqleval_core::{EvalConfig, EvalError, ExecutionOutcome, ExecutionTask, IsolationMode, Result};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Runs tasks with at most `num_workers` executing at once.
///
/// Every submitted task yields exactly one outcome: executor panics and
/// deadline kills are turned into `RuntimeError` and `TimedOut` outcomes.
#[derive(Clone)]
pub struct WorkerPool {
    executor: Arc<dyn TaskExecutor>,
    num_workers: usize,
    metrics: Arc<PoolMetrics>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("executor", &self.executor.name())
            .field("num_workers", &self.num_workers)
            .finish()
    }
}

impl WorkerPool {
    pub fn new(executor: Arc<dyn TaskExecutor>, num_workers: usize) -> Self {
        Self {
            executor,
            num_workers: num_workers.max(1),
            metrics: Arc::new(PoolMetrics::default()),
        }
    }

    pub fn from_config(config: &EvalConfig) -> Result<Self> {
        let margin = config.teardown_margin();
        let executor: Arc<dyn TaskExecutor> = match &config.isolation {
            IsolationMode::Process {
                program: Some(program),
            } => Arc::new(ProcessExecutor::new(program, margin)),
            IsolationMode::Process { program: None } => Arc::new(
                ProcessExecutor::current_exe(margin)
                    .map_err(|e| EvalError::config(format!("cannot locate worker program: {}", e)))?,
            ),
            IsolationMode::Thread => Arc::new(ThreadExecutor::new(margin)),
        };
        Ok(Self::new(executor, config.num_cpu))
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn metrics(&self) -> PoolSnapshot {
        self.metrics.snapshot()
    }

    /// Execute every task and return the outcomes in completion order.
    pub async fn run(&self, tasks: Vec<ExecutionTask>) -> Vec<ExecutionOutcome> {
        let total = tasks.len();
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.num_workers));
        let mut set = JoinSet::new();
        self.metrics.submitted(total);
        info!(
            tasks = total,
            workers = self.num_workers,
            executor = self.executor.name(),
            "dispatching tasks"
        );

        for task in tasks {
            let executor = self.executor.clone();
            let metrics = self.metrics.clone();
            let permits = permits.clone();
            set.spawn(async move {
                let index = task.index();
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return ExecutionOutcome::runtime_error(index, e.to_string()),
                };
                let begin = Instant::now();
                let outcome = AssertUnwindSafe(executor.execute(task))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        ExecutionOutcome::runtime_error(index, panic_message(panic))
                    });
                metrics.record(&outcome, begin.elapsed());
                debug!(index, status = %outcome.status, correct = outcome.correct, "task finished");
                outcome
            });
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // the reassembler reports the index as missing
                Err(e) => error!(error = %e, "pool task was lost"),
            }
        }

        let snapshot = self.metrics.snapshot();
        info!(
            tasks = total,
            elapsed = ?started.elapsed(),
            timed_out = snapshot.timed_out,
            failed = snapshot.failed,
            "pool drained"
        );
        outcomes
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("executor panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqleval_core::{QueryPair, TaskMode, TaskStatus};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn task(index: usize) -> ExecutionTask {
        ExecutionTask {
            pair: QueryPair {
                index,
                predicted_sql: "SELECT 1".into(),
                gold_sql: "SELECT 1".into(),
                db_id: "none".into(),
            },
            db_path: PathBuf::from("/nonexistent.sqlite"),
            timeout: Duration::from_secs(1),
            mode: TaskMode::Correctness {
                order_sensitive: false,
            },
        }
    }

    /// Finishes later tasks first and tracks peak concurrency.
    #[derive(Default)]
    struct ReversingExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for ReversingExecutor {
        async fn execute(&self, task: ExecutionTask) -> ExecutionOutcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let index = task.index();
            tokio::time::sleep(Duration::from_millis(5 * (10 - index as u64))).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if index == 3 {
                panic!("boom at {}", index);
            }
            ExecutionOutcome::correctness(index, true)
        }

        fn name(&self) -> &'static str {
            "reversing"
        }
    }

    #[tokio::test]
    async fn test_every_task_yields_one_outcome() {
        let executor = Arc::new(ReversingExecutor::default());
        let pool = WorkerPool::new(executor.clone(), 3);
        let outcomes = pool.run((0..10).map(task).collect()).await;

        let mut indices: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
        indices.sort();
        assert_eq!(indices, (0..10).collect::<Vec<_>>());
        assert!(executor.peak.load(Ordering::SeqCst) <= 3);

        let panicked = outcomes.iter().find(|o| o.index == 3).unwrap();
        assert_eq!(panicked.status, TaskStatus::RuntimeError);
        assert!(panicked.error_detail.as_deref().unwrap().contains("boom at 3"));

        let snapshot = pool.metrics();
        assert_eq!(snapshot.submitted, 10);
        assert_eq!(snapshot.completed, 10);
        assert_eq!(snapshot.failed, 1);
    }

    #[tokio::test]
    async fn test_thread_executor_reports_missing_database() {
        let pool = WorkerPool::new(Arc::new(ThreadExecutor::new(Duration::from_millis(200))), 2);
        let outcomes = pool.run(vec![task(0)]).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, TaskStatus::RuntimeError);
    }
}
