use crate::session::SqliteSession;
use crate::ExecError;
use sqleval_core::{ExecutionOutcome, ExecutionTask, TaskMode};
use std::time::Duration;
use tracing::debug;

/// Execute the predicted then the gold statement and compare their result sets.
///
/// Either statement failing or exceeding `task.timeout` scores the sample as
/// incorrect; the outcome status says which of the two happened.
pub fn check_correctness(task: &ExecutionTask) -> ExecutionOutcome {
    let index = task.index();
    let order_sensitive = match task.mode {
        TaskMode::Correctness { order_sensitive } => order_sensitive,
        TaskMode::Efficiency { .. } => false,
    };

    let session = match SqliteSession::open(&task.db_path) {
        Ok(session) => session,
        Err(e) => return ExecutionOutcome::runtime_error(index, e.to_string()),
    };

    let predicted = match session.query(&task.pair.predicted_sql, task.timeout) {
        Ok(rows) => rows,
        Err(e) => return failed(index, "predicted", e),
    };
    let gold = match session.query(&task.pair.gold_sql, task.timeout) {
        Ok(rows) => rows,
        Err(e) => return failed(index, "gold", e),
    };

    let correct = predicted.matches(&gold, order_sensitive);
    debug!(
        index,
        correct,
        predicted_rows = predicted.len(),
        gold_rows = gold.len(),
        "compared result sets"
    );
    ExecutionOutcome::correctness(index, correct)
}

pub(crate) fn failed(index: usize, which: &str, err: ExecError) -> ExecutionOutcome {
    match err {
        ExecError::TimedOut(limit) => ExecutionOutcome::timed_out(
            index,
            format!("{} query exceeded {}", which, format_limit(limit)),
        ),
        other => ExecutionOutcome::runtime_error(index, format!("{} query: {}", which, other)),
    }
}

fn format_limit(limit: Duration) -> String {
    format!("{:.3}s", limit.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::concert_db;
    use sqleval_core::{QueryPair, TaskStatus};
    use std::path::Path;

    fn task(path: &Path, predicted: &str, gold: &str, order_sensitive: bool) -> ExecutionTask {
        ExecutionTask {
            pair: QueryPair {
                index: 7,
                predicted_sql: predicted.into(),
                gold_sql: gold.into(),
                db_id: "concert".into(),
            },
            db_path: path.to_path_buf(),
            timeout: Duration::from_secs(5),
            mode: TaskMode::Correctness { order_sensitive },
        }
    }

    #[test]
    fn test_identical_queries_are_correct() -> anyhow::Result<()> {
        let (_dir, path) = concert_db()?;
        let sql = "SELECT name, age FROM singer WHERE age > 20";
        let outcome = check_correctness(&task(&path, sql, sql, false));
        assert_eq!(outcome.index, 7);
        assert_eq!(outcome.status, TaskStatus::Ok);
        assert!(outcome.correct);
        Ok(())
    }

    #[test]
    fn test_row_order_and_column_order() -> anyhow::Result<()> {
        let (_dir, path) = concert_db()?;
        let asc = "SELECT name, age FROM singer ORDER BY age ASC";
        let desc = "SELECT name, age FROM singer ORDER BY age DESC";
        assert!(check_correctness(&task(&path, asc, desc, false)).correct);
        assert!(!check_correctness(&task(&path, asc, desc, true)).correct);

        let swapped = "SELECT age, name FROM singer";
        assert!(!check_correctness(&task(&path, swapped, asc, false)).correct);
        Ok(())
    }

    #[test]
    fn test_real_and_integer_compare_equal() -> anyhow::Result<()> {
        let (_dir, path) = concert_db()?;
        let outcome = check_correctness(&task(
            &path,
            "SELECT CAST(age AS REAL) FROM singer",
            "SELECT age FROM singer",
            false,
        ));
        assert!(outcome.correct);
        Ok(())
    }

    #[test]
    fn test_broken_prediction_is_runtime_error() -> anyhow::Result<()> {
        let (_dir, path) = concert_db()?;
        let outcome = check_correctness(&task(
            &path,
            "SELECT nam FROM singer",
            "SELECT name FROM singer",
            false,
        ));
        assert_eq!(outcome.status, TaskStatus::RuntimeError);
        assert!(!outcome.correct);
        assert!(outcome.error_detail.unwrap().starts_with("predicted query"));
        Ok(())
    }

    #[test]
    fn test_missing_database_is_runtime_error() {
        let outcome = check_correctness(&task(
            Path::new("/does/not/exist.sqlite"),
            "SELECT 1",
            "SELECT 1",
            false,
        ));
        assert_eq!(outcome.status, TaskStatus::RuntimeError);
    }
}
