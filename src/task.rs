use sqleval_core::{EvalError, ExecutionTask, QueryPair, Result, TaskMode};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Turns index-aligned SQL sequences into [`QueryPair`]s and [`ExecutionTask`]s.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    db_dir: PathBuf,
}

impl TaskBuilder {
    pub fn new(db_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_dir: db_dir.into(),
        }
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// `{db_dir}/{db_id}/{db_id}.sqlite`
    pub fn db_path(&self, db_id: &str) -> PathBuf {
        self.db_dir.join(db_id).join(format!("{}.sqlite", db_id))
    }

    /// Pair up the sequences, tagging each pair with its position.
    pub fn pairs(
        &self,
        preds: &[String],
        golds: &[String],
        db_ids: &[String],
    ) -> Result<Vec<QueryPair>> {
        if preds.len() != golds.len() || golds.len() != db_ids.len() {
            return Err(EvalError::config(format!(
                "sequence lengths differ: {} predictions, {} gold queries, {} database ids",
                preds.len(),
                golds.len(),
                db_ids.len()
            )));
        }
        Ok(preds
            .iter()
            .zip(golds)
            .zip(db_ids)
            .enumerate()
            .map(|(index, ((pred, gold), db_id))| QueryPair {
                index,
                predicted_sql: pred.clone(),
                gold_sql: gold.clone(),
                db_id: db_id.clone(),
            })
            .collect())
    }

    pub fn task(&self, pair: &QueryPair, timeout: Duration, mode: TaskMode) -> ExecutionTask {
        ExecutionTask {
            pair: pair.clone(),
            db_path: self.db_path(&pair.db_id),
            timeout,
            mode,
        }
    }
}
