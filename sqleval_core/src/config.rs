use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How each task is isolated from the caller and from its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IsolationMode {
    /// Run every task in a `sqleval worker` subprocess that is killed at its deadline.
    ///
    /// When `program` is `None` the current executable is used, which is right
    /// for the `sqleval` binary itself.
    Process { program: Option<PathBuf> },
    /// Run every task on a blocking thread; a watchdog interrupts SQLite at the deadline.
    Thread,
}

impl Default for IsolationMode {
    fn default() -> Self {
        IsolationMode::Process { program: None }
    }
}

/// Tunables of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Maximum number of tasks executing at once.
    ///
    /// _Default:_ `8`.
    pub num_cpu: usize,
    /// Seconds allowed for each statement of a correctness task.
    ///
    /// _Default:_ `30`.
    pub meta_time_out: f64,
    /// Seconds allowed for each statement execution of an efficiency task.
    ///
    /// _Default:_ `5`.
    pub ves_time_out: f64,
    /// Number of timing trials per statement for VES.
    ///
    /// _Default:_ `100`.
    pub iterate_num: usize,
    /// Ceiling applied to the gold/predicted time ratio before the square root.
    ///
    /// _Default:_ `100.0`.
    pub ratio_upper_bound: f64,
    /// Discard trial timings outside mean ± 3σ before averaging.
    ///
    /// _Default:_ `true`.
    pub remove_outliers: bool,
    /// Extra time granted to an execution unit past its statement budget before it is killed.
    ///
    /// _Default:_ `500`.
    pub teardown_margin_ms: u64,
    /// _Default:_ subprocess isolation.
    pub isolation: IsolationMode,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            num_cpu: 8,
            meta_time_out: 30.0,
            ves_time_out: 5.0,
            iterate_num: 100,
            ratio_upper_bound: 100.0,
            remove_outliers: true,
            teardown_margin_ms: 500,
            isolation: IsolationMode::default(),
        }
    }
}

impl EvalConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: EvalConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_cpu == 0 {
            return Err(EvalError::config("num_cpu must be at least 1"));
        }
        if !(self.meta_time_out.is_finite() && self.meta_time_out > 0.0) {
            return Err(EvalError::config("meta_time_out must be a positive number of seconds"));
        }
        if !(self.ves_time_out.is_finite() && self.ves_time_out > 0.0) {
            return Err(EvalError::config("ves_time_out must be a positive number of seconds"));
        }
        if self.iterate_num == 0 {
            return Err(EvalError::config("iterate_num must be at least 1"));
        }
        if !(self.ratio_upper_bound.is_finite() && self.ratio_upper_bound > 0.0) {
            return Err(EvalError::config("ratio_upper_bound must be positive"));
        }
        Ok(())
    }

    pub fn correctness_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.meta_time_out)
    }

    pub fn efficiency_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ves_time_out)
    }

    pub fn teardown_margin(&self) -> Duration {
        Duration::from_millis(self.teardown_margin_ms)
    }

    pub fn with_num_cpu(mut self, num_cpu: usize) -> Self {
        self.num_cpu = num_cpu;
        self
    }

    pub fn with_meta_time_out(mut self, secs: f64) -> Self {
        self.meta_time_out = secs;
        self
    }

    pub fn with_ves_time_out(mut self, secs: f64) -> Self {
        self.ves_time_out = secs;
        self
    }

    pub fn with_iterate_num(mut self, iterate_num: usize) -> Self {
        self.iterate_num = iterate_num;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = isolation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_evaluators() {
        let config = EvalConfig::default();
        assert_eq!(config.num_cpu, 8);
        assert_eq!(config.correctness_timeout(), Duration::from_secs(30));
        assert_eq!(config.efficiency_timeout(), Duration::from_secs(5));
        assert_eq!(config.iterate_num, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = EvalConfig::default().with_num_cpu(0);
        assert!(matches!(config.validate(), Err(EvalError::Configuration(_))));
        let config = EvalConfig::default().with_meta_time_out(-1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{"num_cpu": 2, "isolation": {{"kind": "thread"}}}}"#
        )?;
        let config = EvalConfig::from_json_file(file.path())?;
        assert_eq!(config.num_cpu, 2);
        assert_eq!(config.isolation, IsolationMode::Thread);
        assert_eq!(config.iterate_num, 100);
        Ok(())
    }
}
