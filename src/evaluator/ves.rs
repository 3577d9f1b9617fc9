use super::{EvaluationContext, Evaluator};
use async_trait::async_trait;
use sqleval_core::{
    ExecutionOutcome, MetricMap, MetricSeries, Result, TaskMode, EXECUTION_ACCURACY,
    VALID_EFFICIENCY_SCORE,
};
use sqleval_db::{clip_ratio, ves_score};
use tracing::info;

/// Produces `valid_efficiency_score`.
///
/// When `execution_accuracy` is already known for the run, samples scored
/// incorrect get a ratio of zero without being dispatched.
#[derive(Debug, Clone, Copy, Default)]
pub struct VesEvaluator;

#[async_trait]
impl Evaluator for VesEvaluator {
    fn name(&self) -> &'static str {
        "ves"
    }

    async fn evaluate(&self, ctx: &EvaluationContext<'_>, prior: &MetricMap) -> Result<MetricMap> {
        let config = ctx.config;
        let known = prior.values(EXECUTION_ACCURACY);
        let mode = TaskMode::Efficiency {
            trial_count: config.iterate_num,
            ratio_upper_bound: config.ratio_upper_bound,
            remove_outliers: config.remove_outliers,
        };

        let mut tasks = Vec::new();
        let mut skipped = Vec::new();
        for pair in ctx.pairs {
            let incorrect = known
                .and_then(|values| values.get(pair.index))
                .is_some_and(|v| *v <= 0.0);
            if incorrect {
                skipped.push(ExecutionOutcome::efficiency(pair.index, 0.0));
            } else {
                tasks.push(ctx.builder.task(pair, config.efficiency_timeout(), mode));
            }
        }
        info!(
            dispatched = tasks.len(),
            skipped = skipped.len(),
            trials = config.iterate_num,
            "measuring efficiency"
        );

        let outcomes = ctx.execute(tasks, skipped).await?;
        let scores = outcomes
            .iter()
            .map(|o| {
                if o.is_ok() {
                    ves_score(clip_ratio(o.time_ratio, config.ratio_upper_bound))
                } else {
                    0.0
                }
            })
            .collect();

        let mut metrics = MetricMap::new();
        metrics.insert(MetricSeries::new(VALID_EFFICIENCY_SCORE, scores))?;
        Ok(metrics)
    }
}
