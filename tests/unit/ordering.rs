use super::{process_config, strings, thread_config, Fixture};
use anyhow::Result;
use pretty_assertions::assert_eq;
use sqleval::{EvalConfig, EvaluationRequest, Orchestrator, EXECUTION_ACCURACY};

/// Alternate slow correct samples with fast wrong ones so completion order
/// differs from input order.
fn interleaved(fixture: &Fixture, count: usize) -> (EvaluationRequest, Vec<f64>) {
    let slow = "WITH RECURSIVE r(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM r WHERE x < 200000) \
                SELECT count(*) FROM r";
    let mut preds = Vec::new();
    let mut golds = Vec::new();
    let mut expected = Vec::new();
    for i in 0..count {
        if i % 2 == 0 {
            preds.push(slow);
            golds.push(slow);
            expected.push(1.0);
        } else {
            preds.push("SELECT b FROM t");
            golds.push("SELECT a FROM t");
            expected.push(0.0);
        }
    }
    let db_ids = vec!["tiny"; count];
    let request = EvaluationRequest::new(
        strings(&preds),
        strings(&golds),
        strings(&db_ids),
        fixture.db_dir(),
    )
    .with_efficiency(false);
    (request, expected)
}

async fn run(config: EvalConfig) -> Result<()> {
    let fixture = Fixture::new()?;
    let (request, expected) = interleaved(&fixture, 12);
    let report = Orchestrator::new(config)?.evaluate(request).await?;
    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), expected.as_slice());
    assert_eq!(report.pool.submitted, 12);
    assert_eq!(report.pool.completed, 12);
    Ok(())
}

#[tokio::test]
async fn test_results_follow_input_order_on_threads() -> Result<()> {
    run(thread_config()).await
}

#[tokio::test]
async fn test_results_follow_input_order_in_processes() -> Result<()> {
    run(process_config()).await
}

#[tokio::test]
async fn test_worker_count_does_not_change_results() -> Result<()> {
    let fixture = Fixture::new()?;
    let (request, _) = interleaved(&fixture, 8);

    let serial = Orchestrator::new(thread_config().with_num_cpu(1))?
        .evaluate(request.clone())
        .await?;
    let parallel = Orchestrator::new(thread_config().with_num_cpu(8))?
        .evaluate(request)
        .await?;
    assert_eq!(serial.metrics, parallel.metrics);
    Ok(())
}

#[tokio::test]
async fn test_empty_request_yields_empty_series() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = EvaluationRequest::new(vec![], vec![], vec![], fixture.db_dir());
    let report = Orchestrator::new(thread_config())?.evaluate(request).await?;
    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[] as &[f64]);
    assert_eq!(report.pool.submitted, 0);
    Ok(())
}
