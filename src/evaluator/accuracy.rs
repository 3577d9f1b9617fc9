use super::{EvaluationContext, Evaluator};
use async_trait::async_trait;
use sqleval_core::{
    MetricMap, MetricSeries, QueryPair, Result, TaskMode, EXACT_MATCH_ACCURACY,
    EXECUTION_ACCURACY,
};
use sqleval_query::lexer::{strip_distinct, tokenize, TokenKind};
use sqleval_query::ExactMatcher;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info};

/// How predicted and gold queries are judged equivalent.
#[derive(Debug, Clone, Default)]
pub enum ComparisonStrategy {
    /// Result rows compared as a multiset; exact match is not computed.
    #[default]
    General,
    /// `DISTINCT` is removed from both queries and result rows are compared in
    /// order when the gold query sorts; exact match computed against the
    /// schema catalog when one is supplied.
    Spider { matcher: Option<Arc<ExactMatcher>> },
}

impl ComparisonStrategy {
    pub fn order_sensitive(&self, gold_sql: &str) -> bool {
        match self {
            ComparisonStrategy::General => false,
            ComparisonStrategy::Spider { .. } => has_order_by(gold_sql),
        }
    }

    /// The pair as it is executed for the correctness check.
    pub fn executed_pair(&self, pair: &QueryPair) -> QueryPair {
        match self {
            ComparisonStrategy::General => pair.clone(),
            ComparisonStrategy::Spider { .. } => QueryPair {
                predicted_sql: strip_distinct(&pair.predicted_sql),
                gold_sql: strip_distinct(&pair.gold_sql),
                ..pair.clone()
            },
        }
    }
}

/// `ORDER BY` anywhere in the statement.
fn has_order_by(sql: &str) -> bool {
    match tokenize(sql) {
        Ok(tokens) => tokens.windows(2).any(|w| {
            matches!(&w[0].kind, TokenKind::Word(a) if a == "order")
                && matches!(&w[1].kind, TokenKind::Word(b) if b == "by")
        }),
        Err(_) => sql.to_lowercase().contains("order by"),
    }
}

/// Produces `execution_accuracy` and `exact_match_accuracy`.
#[derive(Debug, Clone, Default)]
pub struct AccuracyEvaluator {
    strategy: ComparisonStrategy,
}

impl AccuracyEvaluator {
    pub fn new(strategy: ComparisonStrategy) -> Self {
        Self { strategy }
    }

    pub fn general() -> Self {
        Self::new(ComparisonStrategy::General)
    }

    pub fn spider(matcher: Option<ExactMatcher>) -> Self {
        Self::new(ComparisonStrategy::Spider {
            matcher: matcher.map(Arc::new),
        })
    }

    pub fn strategy(&self) -> &ComparisonStrategy {
        &self.strategy
    }

    /// Parsing runs on a blocking thread; a sample whose comparison panics scores 0.
    async fn exact_match(&self, ctx: &EvaluationContext<'_>) -> MetricSeries {
        let count = ctx.sample_count();
        let ComparisonStrategy::Spider {
            matcher: Some(matcher),
        } = &self.strategy
        else {
            return MetricSeries::zeros(EXACT_MATCH_ACCURACY, count);
        };

        let matcher = matcher.clone();
        let pairs = ctx.pairs.to_vec();
        let flags = tokio::task::spawn_blocking(move || {
            pairs
                .iter()
                .map(|p| {
                    catch_unwind(AssertUnwindSafe(|| {
                        matcher.matches(&p.db_id, &p.predicted_sql, &p.gold_sql)
                    }))
                    .unwrap_or_else(|_| {
                        error!(index = p.index, "exact match comparison panicked");
                        false
                    })
                })
                .collect::<Vec<_>>()
        })
        .await;

        match flags {
            Ok(flags) => MetricSeries::from_flags(EXACT_MATCH_ACCURACY, flags),
            Err(e) => {
                error!(error = %e, "exact match worker was lost");
                MetricSeries::zeros(EXACT_MATCH_ACCURACY, count)
            }
        }
    }
}

#[async_trait]
impl Evaluator for AccuracyEvaluator {
    fn name(&self) -> &'static str {
        match self.strategy {
            ComparisonStrategy::General => "general",
            ComparisonStrategy::Spider { .. } => "spider",
        }
    }

    async fn evaluate(&self, ctx: &EvaluationContext<'_>, _prior: &MetricMap) -> Result<MetricMap> {
        let timeout = ctx.config.correctness_timeout();
        let tasks = ctx
            .pairs
            .iter()
            .map(|pair| {
                let mode = TaskMode::Correctness {
                    order_sensitive: self.strategy.order_sensitive(&pair.gold_sql),
                };
                ctx.builder
                    .task(&self.strategy.executed_pair(pair), timeout, mode)
            })
            .collect();
        let outcomes = ctx.execute(tasks, Vec::new()).await?;

        let accuracy =
            MetricSeries::from_flags(EXECUTION_ACCURACY, outcomes.iter().map(|o| o.correct));
        info!(
            evaluator = self.name(),
            mean = accuracy.mean().unwrap_or_default(),
            "execution accuracy computed"
        );

        let mut metrics = MetricMap::new();
        metrics.insert(accuracy)?;
        metrics.insert(self.exact_match(ctx).await)?;
        Ok(metrics)
    }
}
