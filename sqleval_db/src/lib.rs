//! SQLite side of the evaluation engine.
//!
//! Everything here is synchronous and runs inside one execution unit
//! (a `sqleval worker` subprocess or a blocking thread). Databases are
//! always opened read-only and every statement runs under a deadline
//! enforced by interrupting SQLite from a watchdog thread.

pub mod correctness;
pub mod efficiency;
pub mod session;
pub mod value;
pub mod worker;

use std::time::Duration;
use thiserror::Error;

pub use correctness::check_correctness;
pub use efficiency::{clip_ratio, measure_efficiency, time_ratio, ves_score};
pub use session::SqliteSession;
pub use value::{Cell, ResultSet};
pub use worker::{run_task, serve};

/// Failure of a single statement execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("Failed to open database {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Statement exceeded its {0:?} deadline")]
    TimedOut(Duration),

    #[error("SQL error: {0}")]
    Sql(String),
}

impl ExecError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::TimedOut(_))
    }
}
