use crate::evaluator::{AccuracyEvaluator, EvaluationContext, Evaluator, VesEvaluator};
use crate::formula::apply_formulas;
use crate::pool::{PoolSnapshot, WorkerPool};
use crate::task::TaskBuilder;
use serde::{Deserialize, Serialize};
use sqleval_core::{EvalConfig, EvalError, FormulaEvaluationError, MetricFormula, MetricMap, Result};
use sqleval_query::{ExactMatcher, SchemaCatalog};
use std::collections::BTreeMap;
use std::path::PathBuf;
use strum::Display;
use tracing::info;

/// Phases of one evaluation run, entered strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Built,
    Dispatched,
    Collected,
    Merged,
    FormulasApplied,
    Done,
}

impl RunState {
    fn may_enter(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Built, Dispatched)
                | (Dispatched, Collected)
                | (Collected, Merged)
                | (Merged, FormulasApplied)
                | (Merged, Done)
                | (FormulasApplied, Done)
        )
    }
}

/// Which correctness comparison a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyMode {
    #[default]
    General,
    Spider,
}

/// Inputs of one evaluation call. The sequences are index-aligned and already
/// in canonical sample order.
#[derive(Debug, Clone, Default)]
pub struct EvaluationRequest {
    pub golds: Vec<String>,
    pub preds: Vec<String>,
    pub db_ids: Vec<String>,
    pub db_dir: PathBuf,
    /// Schema metadata enabling exact match under [`AccuracyMode::Spider`].
    pub tables: Option<SchemaCatalog>,
    pub accuracy: AccuracyMode,
    /// Also compute `valid_efficiency_score`.
    pub measure_efficiency: bool,
    /// One JSON document per sample bound to `samples_attrs`, or empty.
    pub attributes: Vec<serde_json::Value>,
    pub formulas: Vec<MetricFormula>,
}

impl EvaluationRequest {
    pub fn new(
        preds: Vec<String>,
        golds: Vec<String>,
        db_ids: Vec<String>,
        db_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            golds,
            preds,
            db_ids,
            db_dir: db_dir.into(),
            measure_efficiency: true,
            ..Default::default()
        }
    }

    pub fn with_tables(mut self, tables: SchemaCatalog) -> Self {
        self.tables = Some(tables);
        self
    }

    pub fn with_accuracy(mut self, accuracy: AccuracyMode) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_efficiency(mut self, measure: bool) -> Self {
        self.measure_efficiency = measure;
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<serde_json::Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_formulas(mut self, formulas: Vec<MetricFormula>) -> Self {
        self.formulas = formulas;
        self
    }
}

/// Final output: base plus derived metrics, and the derived metrics that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metrics: MetricMap,
    pub formula_errors: Vec<FormulaEvaluationError>,
    #[serde(skip)]
    pub pool: PoolSnapshot,
}

impl EvaluationReport {
    pub fn per_sample(&self) -> Vec<BTreeMap<String, f64>> {
        self.metrics.per_sample()
    }
}

/// Composes task building, the pool, the evaluators and the formula pass.
#[derive(Debug)]
pub struct Orchestrator {
    config: EvalConfig,
    pool: WorkerPool,
    state: RunState,
}

impl Orchestrator {
    pub fn new(config: EvalConfig) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::from_config(&config)?;
        Ok(Self::with_pool(config, pool))
    }

    pub fn with_pool(config: EvalConfig, pool: WorkerPool) -> Self {
        Self {
            config,
            pool,
            state: RunState::Built,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn enter(&mut self, next: RunState) -> Result<()> {
        if !self.state.may_enter(next) {
            return Err(EvalError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        info!(from = %self.state, to = %next, "evaluation state");
        self.state = next;
        Ok(())
    }

    /// Run every configured evaluator over the request. Consumes the
    /// orchestrator: one orchestrator serves one request.
    pub async fn evaluate(mut self, request: EvaluationRequest) -> Result<EvaluationReport> {
        let builder = TaskBuilder::new(&request.db_dir);
        let pairs = builder.pairs(&request.preds, &request.golds, &request.db_ids)?;
        if !request.attributes.is_empty() && request.attributes.len() != pairs.len() {
            return Err(EvalError::config(format!(
                "{} attribute records for {} samples",
                request.attributes.len(),
                pairs.len()
            )));
        }

        let accuracy = match request.accuracy {
            AccuracyMode::General => AccuracyEvaluator::general(),
            AccuracyMode::Spider => {
                AccuracyEvaluator::spider(request.tables.clone().map(ExactMatcher::new))
            }
        };
        let mut evaluators: Vec<Box<dyn Evaluator>> = vec![Box::new(accuracy)];
        if request.measure_efficiency {
            evaluators.push(Box::new(VesEvaluator));
        }

        self.enter(RunState::Dispatched)?;
        let ctx = EvaluationContext {
            pairs: &pairs,
            builder: &builder,
            pool: &self.pool,
            config: &self.config,
        };
        let mut collected = Vec::with_capacity(evaluators.len());
        let mut prior = MetricMap::new();
        for evaluator in &evaluators {
            let produced = evaluator.evaluate(&ctx, &prior).await?;
            prior.merge(produced.clone())?;
            collected.push(produced);
        }
        self.enter(RunState::Collected)?;

        let mut metrics = MetricMap::new();
        for produced in collected {
            metrics.merge(produced)?;
        }
        self.enter(RunState::Merged)?;

        let mut formula_errors = Vec::new();
        if !request.formulas.is_empty() {
            formula_errors = apply_formulas(&request.formulas, &mut metrics, &request.attributes);
            self.enter(RunState::FormulasApplied)?;
        }
        self.enter(RunState::Done)?;

        Ok(EvaluationReport {
            metrics,
            formula_errors,
            pool: self.pool.metrics(),
        })
    }
}
