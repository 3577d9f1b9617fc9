use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumIter, EnumString};

pub const EXECUTION_ACCURACY: &str = "execution_accuracy";
pub const EXACT_MATCH_ACCURACY: &str = "exact_match_accuracy";
pub const VALID_EFFICIENCY_SCORE: &str = "valid_efficiency_score";

/// The base metrics every evaluation run produces, in report order.
pub const BASE_METRICS: [&str; 3] = [EXECUTION_ACCURACY, EXACT_MATCH_ACCURACY, VALID_EFFICIENCY_SCORE];

/// One (predicted, gold) sample, tagged with its position in the canonical ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPair {
    pub index: usize,
    pub predicted_sql: String,
    pub gold_sql: String,
    pub db_id: String,
}

/// What a worker does with a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskMode {
    /// Compare result sets. `order_sensitive` compares rows as an ordered list.
    Correctness { order_sensitive: bool },
    /// Re-run both statements `trial_count` times and report the clipped time ratio.
    Efficiency {
        trial_count: usize,
        ratio_upper_bound: f64,
        remove_outliers: bool,
    },
}

impl TaskMode {
    /// Number of statement executions a task of this mode performs at most.
    pub fn statement_count(&self) -> u32 {
        match self {
            TaskMode::Correctness { .. } => 2,
            TaskMode::Efficiency { trial_count, .. } => {
                u32::try_from(*trial_count)
                    .unwrap_or(u32::MAX)
                    .saturating_mul(2)
                    .saturating_add(2)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTask {
    pub pair: QueryPair,
    pub db_path: PathBuf,
    /// Deadline for a single statement execution.
    pub timeout: Duration,
    pub mode: TaskMode,
}

impl ExecutionTask {
    pub fn index(&self) -> usize {
        self.pair.index
    }

    /// Wall-clock budget after which the execution unit is killed.
    pub fn hard_deadline(&self, teardown_margin: Duration) -> Duration {
        self.timeout
            .saturating_mul(self.mode.statement_count())
            .saturating_add(teardown_margin)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Ok,
    TimedOut,
    RuntimeError,
}

/// The single result produced for every submitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub index: usize,
    pub status: TaskStatus,
    pub correct: bool,
    pub time_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ExecutionOutcome {
    pub fn correctness(index: usize, correct: bool) -> Self {
        Self {
            index,
            status: TaskStatus::Ok,
            correct,
            time_ratio: 0.0,
            error_detail: None,
        }
    }

    pub fn efficiency(index: usize, time_ratio: f64) -> Self {
        Self {
            index,
            status: TaskStatus::Ok,
            correct: time_ratio > 0.0,
            time_ratio,
            error_detail: None,
        }
    }

    pub fn timed_out(index: usize, detail: impl Into<String>) -> Self {
        Self {
            index,
            status: TaskStatus::TimedOut,
            correct: false,
            time_ratio: 0.0,
            error_detail: Some(detail.into()),
        }
    }

    pub fn runtime_error(index: usize, detail: impl Into<String>) -> Self {
        Self {
            index,
            status: TaskStatus::RuntimeError,
            correct: false,
            time_ratio: 0.0,
            error_detail: Some(detail.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == TaskStatus::Ok
    }
}

/// An ordered, index-aligned sequence of per-sample values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub name: String,
    pub values: Vec<f64>,
}

impl MetricSeries {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn from_flags(name: impl Into<String>, flags: impl IntoIterator<Item = bool>) -> Self {
        Self::new(
            name,
            flags.into_iter().map(|f| if f { 1.0 } else { 0.0 }).collect(),
        )
    }

    pub fn zeros(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, vec![0.0; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }
}

/// Metric name to series. Every series in one map has the same length.
///
/// Serializes as `{name: [values]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<String, Vec<f64>>",
    try_from = "BTreeMap<String, Vec<f64>>"
)]
pub struct MetricMap {
    series: BTreeMap<String, MetricSeries>,
}

impl MetricMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample count shared by all series, if any series is present.
    pub fn sample_count(&self) -> Option<usize> {
        self.series.values().next().map(MetricSeries::len)
    }

    pub fn insert(&mut self, series: MetricSeries) -> Result<()> {
        if let Some(expected) = self.sample_count() {
            let actual = series.len();
            if actual != expected && !self.is_only(&series.name) {
                return Err(EvalError::SeriesLength {
                    name: series.name,
                    expected,
                    actual,
                });
            }
        }
        self.series.insert(series.name.clone(), series);
        Ok(())
    }

    /// Merge another map into this one, replacing series with the same name.
    pub fn merge(&mut self, other: MetricMap) -> Result<()> {
        for (_, series) in other.series {
            self.insert(series)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetricSeries> {
        self.series.get(name)
    }

    pub fn values(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|s| s.values.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSeries> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Pivot into one `{metric: value}` record per sample.
    pub fn per_sample(&self) -> Vec<BTreeMap<String, f64>> {
        let count = self.sample_count().unwrap_or(0);
        (0..count)
            .map(|i| {
                self.series
                    .iter()
                    .map(|(name, s)| (name.clone(), s.values[i]))
                    .collect()
            })
            .collect()
    }

    fn is_only(&self, name: &str) -> bool {
        self.series.len() == 1 && self.series.contains_key(name)
    }
}

impl From<MetricMap> for BTreeMap<String, Vec<f64>> {
    fn from(map: MetricMap) -> Self {
        map.series
            .into_iter()
            .map(|(name, series)| (name, series.values))
            .collect()
    }
}

impl TryFrom<BTreeMap<String, Vec<f64>>> for MetricMap {
    type Error = EvalError;

    fn try_from(raw: BTreeMap<String, Vec<f64>>) -> Result<Self> {
        let mut map = MetricMap::new();
        for (name, values) in raw {
            map.insert(MetricSeries::new(name, values))?;
        }
        Ok(map)
    }
}

/// Variables a derived-metric formula may reference.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FreeVariable {
    SamplesAttrs,
    ExecutionAccuracy,
    ExactMatchAccuracy,
    ValidEfficiencyScore,
}

impl FreeVariable {
    pub fn all() -> BTreeSet<FreeVariable> {
        use strum::IntoEnumIterator;
        FreeVariable::iter().collect()
    }
}

/// A caller-defined metric computed from the base metrics and sample attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFormula {
    pub name: String,
    pub expression: String,
    #[serde(default = "FreeVariable::all")]
    pub free_variables: BTreeSet<FreeVariable>,
}

impl MetricFormula {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
            free_variables: FreeVariable::all(),
        }
    }

    pub fn with_variables(mut self, variables: impl IntoIterator<Item = FreeVariable>) -> Self {
        self.free_variables = variables.into_iter().collect();
        self
    }
}
