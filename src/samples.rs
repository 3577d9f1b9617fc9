//! Sample and metric-definition files consumed by the `sqleval run` driver.

use crate::orchestrator::EvaluationRequest;
use serde::{Deserialize, Serialize};
use sqleval_core::{EvalError, FreeVariable, MetricFormula, Result};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Stable sample identifier; numeric ids sort before textual ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleId::Number(n) => write!(f, "{}", n),
            SampleId::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub gold: String,
    pub prediction: String,
    pub db_id: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// Samples in canonical (id) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    /// Reject duplicate ids, then sort by id.
    pub fn new(mut samples: Vec<Sample>) -> Result<Self> {
        let mut seen = HashSet::new();
        for sample in &samples {
            if !seen.insert(&sample.id) {
                return Err(EvalError::config(format!("duplicate sample id {}", sample.id)));
            }
        }
        samples.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Self { samples })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::new(serde_json::from_str(&content)?)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &SampleId> {
        self.samples.iter().map(|s| &s.id)
    }

    pub fn into_request(self, db_dir: impl Into<PathBuf>) -> EvaluationRequest {
        let mut preds = Vec::with_capacity(self.samples.len());
        let mut golds = Vec::with_capacity(self.samples.len());
        let mut db_ids = Vec::with_capacity(self.samples.len());
        let mut attributes = Vec::with_capacity(self.samples.len());
        for sample in self.samples {
            preds.push(sample.prediction);
            golds.push(sample.gold);
            db_ids.push(sample.db_id);
            attributes.push(sample.attributes);
        }
        EvaluationRequest::new(preds, golds, db_ids, db_dir).with_attributes(attributes)
    }
}

/// One entry of a metric-definition file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub rule_definition: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "FreeVariable::all")]
    pub free_variables: BTreeSet<FreeVariable>,
}

impl From<MetricDefinition> for MetricFormula {
    fn from(def: MetricDefinition) -> Self {
        MetricFormula::new(def.name, def.rule_definition).with_variables(def.free_variables)
    }
}

pub fn load_metric_definitions(path: impl AsRef<Path>) -> Result<Vec<MetricFormula>> {
    let content = std::fs::read_to_string(path)?;
    let defs: Vec<MetricDefinition> = serde_json::from_str(&content)?;
    Ok(defs.into_iter().map(MetricFormula::from).collect())
}
