use crate::correctness::failed;
use crate::session::SqliteSession;
use sqleval_core::{ExecutionOutcome, ExecutionTask, TaskMode};
use tracing::debug;

/// Re-run the pair `trial_count` times and report the clipped gold/predicted time ratio.
///
/// The pair is first executed once to confirm the results agree; a mismatch
/// scores a ratio of zero without timing anything. Any statement exceeding
/// `task.timeout` aborts the measurement with a ratio of zero.
pub fn measure_efficiency(task: &ExecutionTask) -> ExecutionOutcome {
    let index = task.index();
    let (trial_count, upper_bound, remove_outliers) = match task.mode {
        TaskMode::Efficiency {
            trial_count,
            ratio_upper_bound,
            remove_outliers,
        } => (trial_count, ratio_upper_bound, remove_outliers),
        TaskMode::Correctness { .. } => {
            return ExecutionOutcome::runtime_error(index, "efficiency worker got a correctness task")
        }
    };

    let session = match SqliteSession::open(&task.db_path) {
        Ok(session) => session,
        Err(e) => return ExecutionOutcome::runtime_error(index, e.to_string()),
    };
    let (predicted_sql, gold_sql) = (&task.pair.predicted_sql, &task.pair.gold_sql);

    let predicted = match session.query(predicted_sql, task.timeout) {
        Ok(rows) => rows,
        Err(e) => return failed(index, "predicted", e),
    };
    let gold = match session.query(gold_sql, task.timeout) {
        Ok(rows) => rows,
        Err(e) => return failed(index, "gold", e),
    };
    if !predicted.same_rows(&gold) {
        debug!(index, "results differ, skipping timing");
        return ExecutionOutcome::efficiency(index, 0.0);
    }

    let mut predicted_times = Vec::with_capacity(trial_count);
    let mut gold_times = Vec::with_capacity(trial_count);
    for _ in 0..trial_count {
        match session.timed_query(predicted_sql, task.timeout) {
            Ok((_, elapsed)) => predicted_times.push(elapsed.as_secs_f64()),
            Err(e) => return failed(index, "predicted", e),
        }
        match session.timed_query(gold_sql, task.timeout) {
            Ok((_, elapsed)) => gold_times.push(elapsed.as_secs_f64()),
            Err(e) => return failed(index, "gold", e),
        }
    }

    let ratio = time_ratio(&gold_times, &predicted_times, remove_outliers, upper_bound);
    debug!(index, ratio, trials = trial_count, "measured time ratio");
    ExecutionOutcome::efficiency(index, ratio)
}

/// `mean(gold) / mean(predicted)`, clipped to `[0, upper_bound]`.
pub fn time_ratio(gold: &[f64], predicted: &[f64], remove_outliers: bool, upper_bound: f64) -> f64 {
    let (gold, predicted) = if remove_outliers {
        (without_outliers(gold), without_outliers(predicted))
    } else {
        (gold.to_vec(), predicted.to_vec())
    };
    let (Some(gold_mean), Some(predicted_mean)) = (mean(&gold), mean(&predicted)) else {
        return 0.0;
    };
    let raw = if predicted_mean > 0.0 {
        gold_mean / predicted_mean
    } else if gold_mean > 0.0 {
        upper_bound
    } else {
        1.0
    };
    clip_ratio(raw, upper_bound)
}

pub fn clip_ratio(ratio: f64, upper_bound: f64) -> f64 {
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, upper_bound)
    }
}

/// Per-sample valid efficiency score.
pub fn ves_score(time_ratio: f64) -> f64 {
    time_ratio.max(0.0).sqrt() * 100.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Keep values within three standard deviations of the mean.
fn without_outliers(values: &[f64]) -> Vec<f64> {
    let Some(mu) = mean(values) else {
        return Vec::new();
    };
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    let sigma = variance.sqrt();
    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| (v - mu).abs() <= 3.0 * sigma)
        .collect();
    if kept.is_empty() {
        values.to_vec()
    } else {
        kept
    }
}
