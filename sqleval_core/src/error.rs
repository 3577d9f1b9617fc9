use std::io;
use thiserror::Error;

/// Fatal errors of an evaluation run. Per-task failures are not errors;
/// they travel as [`TaskStatus`](crate::TaskStatus) inside an outcome.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Incomplete results: no outcome for sample indices {missing:?}")]
    IncompleteResult { missing: Vec<usize> },

    #[error("Unexpected outcome for sample {index}: {reason}")]
    UnexpectedOutcome { index: usize, reason: String },

    #[error("Metric series {name} has {actual} values, expected {expected}")]
    SeriesLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid evaluation state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvalError {
    pub fn config(msg: impl Into<String>) -> Self {
        EvalError::Configuration(msg.into())
    }
}

/// A derived metric could not be computed. Only that metric is lost.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[error("Formula for metric \"{metric}\" failed{}: {reason}", sample_suffix(.sample))]
pub struct FormulaEvaluationError {
    pub metric: String,
    pub sample: Option<usize>,
    pub reason: String,
}

fn sample_suffix(sample: &Option<usize>) -> String {
    match sample {
        Some(i) => format!(" at sample {}", i),
        None => String::new(),
    }
}

impl FormulaEvaluationError {
    pub fn new(metric: impl Into<String>, sample: Option<usize>, reason: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            sample,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
