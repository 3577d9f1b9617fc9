//! Execution-unit entry point.
//!
//! The parent writes one JSON-encoded [`ExecutionTask`] to the worker's stdin
//! and reads back one JSON-encoded [`ExecutionOutcome`] from its stdout.
//! Logging goes to stderr so stdout carries nothing but the outcome.

use crate::correctness::check_correctness;
use crate::efficiency::measure_efficiency;
use anyhow::{Context, Result};
use sqleval_core::{ExecutionOutcome, ExecutionTask, TaskMode};
use std::io::{Read, Write};

/// Run one task to completion inside the current execution unit.
pub fn run_task(task: &ExecutionTask) -> ExecutionOutcome {
    match task.mode {
        TaskMode::Correctness { .. } => check_correctness(task),
        TaskMode::Efficiency { .. } => measure_efficiency(task),
    }
}

/// Read a task from `input`, run it, and write its outcome to `output`.
pub fn serve<R: Read, W: Write>(input: R, mut output: W) -> Result<ExecutionOutcome> {
    let task: ExecutionTask =
        serde_json::from_reader(input).context("Failed to decode task from stdin")?;
    tracing::debug!(index = task.index(), db = %task.db_path.display(), "worker received task");
    let outcome = run_task(&task);
    serde_json::to_writer(&mut output, &outcome).context("Failed to encode outcome")?;
    output.write_all(b"\n")?;
    output.flush()?;
    Ok(outcome)
}
