//! The evaluator variants: execution/exact-match accuracy and valid efficiency score.

mod accuracy;
mod ves;

pub use accuracy::{AccuracyEvaluator, ComparisonStrategy};
pub use ves::VesEvaluator;

use crate::pool::WorkerPool;
use crate::reassemble::Reassembler;
use crate::task::TaskBuilder;
use async_trait::async_trait;
use sqleval_core::{EvalConfig, ExecutionOutcome, ExecutionTask, MetricMap, QueryPair, Result};

/// Everything an evaluator needs for one run.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub pairs: &'a [QueryPair],
    pub builder: &'a TaskBuilder,
    pub pool: &'a WorkerPool,
    pub config: &'a EvalConfig,
}

impl EvaluationContext<'_> {
    pub fn sample_count(&self) -> usize {
        self.pairs.len()
    }

    /// Run `tasks` on the pool and return one outcome per sample, in sample order.
    ///
    /// `prefilled` outcomes stand in for samples that were not dispatched.
    pub async fn execute(
        &self,
        tasks: Vec<ExecutionTask>,
        prefilled: Vec<ExecutionOutcome>,
    ) -> Result<Vec<ExecutionOutcome>> {
        let mut reassembler = Reassembler::new(self.sample_count());
        reassembler.extend(prefilled)?;
        reassembler.extend(self.pool.run(tasks).await)?;
        reassembler.finish()
    }
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce this evaluator's metric series. `prior` holds series computed
    /// earlier in the same run.
    async fn evaluate(&self, ctx: &EvaluationContext<'_>, prior: &MetricMap) -> Result<MetricMap>;
}
