//! sqleval - execution-based evaluation of text-to-SQL predictions
//!
//! Predicted and gold queries are executed against read-only SQLite databases
//! in isolated, deadline-bounded execution units. The engine reports execution
//! accuracy, Spider-style exact match and the valid efficiency score for every
//! sample, plus any derived metrics defined by restricted formulas.
//!
//! ```no_run
//! use sqleval::{EvalConfig, EvaluationRequest, Orchestrator};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let request = EvaluationRequest::new(
//!     vec!["SELECT name FROM singer".into()],
//!     vec!["SELECT name FROM singer".into()],
//!     vec!["concert_singer".into()],
//!     "data/dev_databases",
//! );
//! let report = Orchestrator::new(EvalConfig::default())?
//!     .evaluate(request)
//!     .await?;
//! println!("{:?}", report.metrics.values("execution_accuracy"));
//! # Ok(())
//! # }
//! ```

pub mod evaluator;
pub mod formula;
pub mod orchestrator;
pub mod pool;
pub mod reassemble;
pub mod samples;
pub mod task;

// Re-exports for convenience
pub use orchestrator::{AccuracyMode, EvaluationReport, EvaluationRequest, Orchestrator, RunState};
pub use samples::{load_metric_definitions, Sample, SampleSet};
pub use sqleval_core::*;
pub use sqleval_db;
pub use sqleval_query;
pub use sqleval_query::SchemaCatalog;
