use anyhow::{bail, Context};
use async_trait::async_trait;
use sqleval_core::{ExecutionOutcome, ExecutionTask};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

/// Runs one task inside some execution unit and always answers with an outcome.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    async fn execute(&self, task: ExecutionTask) -> ExecutionOutcome;

    fn name(&self) -> &'static str;
}

/// Each task runs in its own `sqleval worker` subprocess, killed at the task's hard deadline.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    teardown_margin: Duration,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>, teardown_margin: Duration) -> Self {
        Self {
            program: program.into(),
            teardown_margin,
        }
    }

    /// Use the running executable as the worker program.
    pub fn current_exe(teardown_margin: Duration) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, teardown_margin))
    }

    async fn run(&self, payload: Vec<u8>) -> anyhow::Result<ExecutionOutcome> {
        let mut child = Command::new(&self.program)
            .arg("worker")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn worker {}", self.program.display()))?;

        let mut stdin = child.stdin.take().context("worker stdin unavailable")?;
        stdin.write_all(&payload).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "worker exited with {}: {}",
                output.status,
                stderr.lines().last().unwrap_or_default()
            );
        }
        serde_json::from_slice(&output.stdout).context("worker produced no outcome")
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    async fn execute(&self, task: ExecutionTask) -> ExecutionOutcome {
        let index = task.index();
        let deadline = task.hard_deadline(self.teardown_margin);
        let payload = match serde_json::to_vec(&task) {
            Ok(payload) => payload,
            Err(e) => return ExecutionOutcome::runtime_error(index, e.to_string()),
        };

        // dropping the run future kills the child
        match timeout(deadline, self.run(payload)).await {
            Ok(Ok(outcome)) if outcome.index == index => outcome,
            Ok(Ok(outcome)) => ExecutionOutcome::runtime_error(
                index,
                format!("worker answered for sample {}", outcome.index),
            ),
            Ok(Err(e)) => ExecutionOutcome::runtime_error(index, format!("{:#}", e)),
            Err(_) => {
                warn!(index, ?deadline, "killed worker process at deadline");
                ExecutionOutcome::timed_out(
                    index,
                    format!("execution unit killed after {:.3}s", deadline.as_secs_f64()),
                )
            }
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Each task runs on a blocking thread; SQLite is interrupted from a watchdog
/// at every statement deadline and the caller stops waiting at the hard deadline.
#[derive(Debug, Clone)]
pub struct ThreadExecutor {
    teardown_margin: Duration,
}

impl ThreadExecutor {
    pub fn new(teardown_margin: Duration) -> Self {
        Self { teardown_margin }
    }
}

#[async_trait]
impl TaskExecutor for ThreadExecutor {
    async fn execute(&self, task: ExecutionTask) -> ExecutionOutcome {
        let index = task.index();
        let deadline = task.hard_deadline(self.teardown_margin);
        let handle = tokio::task::spawn_blocking(move || sqleval_db::run_task(&task));

        match timeout(deadline, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ExecutionOutcome::runtime_error(index, format!("worker thread: {}", e)),
            Err(_) => {
                warn!(index, ?deadline, "abandoned worker thread at deadline");
                ExecutionOutcome::timed_out(
                    index,
                    format!("execution unit abandoned after {:.3}s", deadline.as_secs_f64()),
                )
            }
        }
    }

    fn name(&self) -> &'static str {
        "thread"
    }
}
