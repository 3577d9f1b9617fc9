use super::{process_config, strings, thread_config, Fixture, ENDLESS_QUERY};
use anyhow::Result;
use pretty_assertions::assert_eq;
use sqleval::{
    EvaluationRequest, IsolationMode, Orchestrator, EXACT_MATCH_ACCURACY, EXECUTION_ACCURACY,
    VALID_EFFICIENCY_SCORE,
};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_identical_queries_score_full_marks() -> Result<()> {
    let fixture = Fixture::new()?;
    let sql = "SELECT a, b FROM t";
    let request = EvaluationRequest::new(
        strings(&[sql, sql, sql]),
        strings(&[sql, sql, sql]),
        strings(&["tiny", "tiny", "tiny"]),
        fixture.db_dir(),
    );

    let report = Orchestrator::new(process_config())?
        .evaluate(request)
        .await?;

    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[1.0, 1.0, 1.0]);
    assert_eq!(report.metrics.values(EXACT_MATCH_ACCURACY).unwrap(), &[0.0, 0.0, 0.0]);
    let ves = report.metrics.values(VALID_EFFICIENCY_SCORE).unwrap();
    assert_eq!(ves.len(), 3);
    // timing noise on microsecond queries; identical statements stay near a ratio of 1
    assert!(ves.iter().all(|v| (50.0..=200.0).contains(v)), "{:?}", ves);
    assert!(report.formula_errors.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_syntax_error_scores_zero() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = EvaluationRequest::new(
        strings(&["SELEC a FROM t"]),
        strings(&["SELECT a FROM t"]),
        strings(&["tiny"]),
        fixture.db_dir(),
    );

    let report = Orchestrator::new(process_config())?
        .evaluate(request)
        .await?;

    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[0.0]);
    assert_eq!(report.metrics.values(VALID_EFFICIENCY_SCORE).unwrap(), &[0.0]);
    assert_eq!(report.pool.failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_endless_query_times_out_in_worker_process() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = EvaluationRequest::new(
        strings(&[ENDLESS_QUERY]),
        strings(&["SELECT a FROM t"]),
        strings(&["tiny"]),
        fixture.db_dir(),
    );

    let started = Instant::now();
    let report = Orchestrator::new(process_config().with_meta_time_out(2.0))?
        .evaluate(request)
        .await?;
    let elapsed = started.elapsed();

    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[0.0]);
    assert_eq!(report.metrics.values(VALID_EFFICIENCY_SCORE).unwrap(), &[0.0]);
    assert_eq!(report.pool.timed_out, 1);
    assert!(elapsed < Duration::from_secs(6), "took {:?}", elapsed);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_unresponsive_worker_is_killed_at_hard_deadline() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new()?;
    let program = fixture.db_dir().join("stuck-worker.sh");
    std::fs::write(&program, "#!/bin/sh\nexec sleep 60\n")?;
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))?;

    let config = process_config()
        .with_meta_time_out(1.0)
        .with_isolation(IsolationMode::Process {
            program: Some(program),
        });
    let request = EvaluationRequest::new(
        strings(&["SELECT a FROM t"]),
        strings(&["SELECT a FROM t"]),
        strings(&["tiny"]),
        fixture.db_dir(),
    );

    let started = Instant::now();
    let report = Orchestrator::new(config)?.evaluate(request).await?;
    let elapsed = started.elapsed();

    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[0.0]);
    assert_eq!(report.pool.timed_out, 1);
    // two statements of 1s each plus the 500ms teardown margin
    assert!(elapsed >= Duration::from_millis(2_400), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
    Ok(())
}

#[tokio::test]
async fn test_endless_query_times_out_on_thread() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = EvaluationRequest::new(
        strings(&[ENDLESS_QUERY, "SELECT a FROM t"]),
        strings(&["SELECT a FROM t", "SELECT a FROM t"]),
        strings(&["tiny", "tiny"]),
        fixture.db_dir(),
    )
    .with_efficiency(false);

    let report = Orchestrator::new(thread_config().with_meta_time_out(1.0))?
        .evaluate(request)
        .await?;

    // the sibling task is unaffected by the timeout
    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[0.0, 1.0]);
    assert!(!report.metrics.contains(VALID_EFFICIENCY_SCORE));
    assert_eq!(report.pool.timed_out, 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_database_is_absorbed() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = EvaluationRequest::new(
        strings(&["SELECT 1", "SELECT a FROM t"]),
        strings(&["SELECT 1", "SELECT a FROM t"]),
        strings(&["nowhere", "tiny"]),
        fixture.db_dir(),
    );

    let report = Orchestrator::new(thread_config())?.evaluate(request).await?;
    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[0.0, 1.0]);
    Ok(())
}
