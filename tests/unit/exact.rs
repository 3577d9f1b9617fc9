use super::{strings, thread_config, Fixture};
use anyhow::Result;
use pretty_assertions::assert_eq;
use sqleval::{
    AccuracyMode, EvaluationRequest, Orchestrator, SchemaCatalog, EXACT_MATCH_ACCURACY,
    EXECUTION_ACCURACY,
};

#[tokio::test]
async fn test_spider_mode_scores_exact_match() -> Result<()> {
    let fixture = Fixture::new()?;
    let tables = SchemaCatalog::from_json_value(fixture.tables_json())?;
    let request = EvaluationRequest::new(
        strings(&[
            "select T1.name from singer as T1 where T1.age > 40",
            "SELECT name FROM singer WHERE age >= 41",
            "SELECT name FROM singer ORDER BY age",
        ]),
        strings(&[
            "SELECT name FROM singer WHERE age > 30",
            "SELECT name FROM singer WHERE age > 40",
            "SELECT name FROM singer ORDER BY age DESC",
        ]),
        strings(&["concert", "concert", "concert"]),
        fixture.db_dir(),
    )
    .with_accuracy(AccuracyMode::Spider)
    .with_tables(tables)
    .with_efficiency(false);

    let report = Orchestrator::new(thread_config())?.evaluate(request).await?;

    // literal values are ignored by exact match; row order matters for ORDER BY golds
    assert_eq!(report.metrics.values(EXACT_MATCH_ACCURACY).unwrap(), &[1.0, 0.0, 0.0]);
    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[1.0, 1.0, 0.0]);
    Ok(())
}

#[tokio::test]
async fn test_spider_mode_without_tables_has_zero_exact_match() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = EvaluationRequest::new(
        strings(&["SELECT name FROM singer"]),
        strings(&["SELECT name FROM singer"]),
        strings(&["concert"]),
        fixture.db_dir(),
    )
    .with_accuracy(AccuracyMode::Spider)
    .with_efficiency(false);

    let report = Orchestrator::new(thread_config())?.evaluate(request).await?;
    assert_eq!(report.metrics.values(EXACT_MATCH_ACCURACY).unwrap(), &[0.0]);
    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[1.0]);
    Ok(())
}

#[tokio::test]
async fn test_deeply_nested_prediction_scores_zero() -> Result<()> {
    let fixture = Fixture::new()?;
    let tables = SchemaCatalog::from_json_value(fixture.tables_json())?;
    let deep = format!(
        "SELECT name FROM singer WHERE age > {}1{}",
        "(".repeat(1_000),
        ")".repeat(1_000)
    );
    let request = EvaluationRequest::new(
        vec![deep, "SELECT name FROM singer".to_string()],
        strings(&["SELECT name FROM singer WHERE age > 40", "SELECT name FROM singer"]),
        strings(&["concert", "concert"]),
        fixture.db_dir(),
    )
    .with_accuracy(AccuracyMode::Spider)
    .with_tables(tables)
    .with_efficiency(false);

    let report = Orchestrator::new(thread_config())?.evaluate(request).await?;

    assert_eq!(report.metrics.values(EXACT_MATCH_ACCURACY).unwrap(), &[0.0, 1.0]);
    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap()[1], 1.0);
    Ok(())
}

#[tokio::test]
async fn test_spider_mode_ignores_distinct_when_executing() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = || {
        EvaluationRequest::new(
            strings(&["SELECT country FROM singer"]),
            strings(&["SELECT DISTINCT country FROM singer"]),
            strings(&["concert"]),
            fixture.db_dir(),
        )
        .with_efficiency(false)
    };

    let spider = Orchestrator::new(thread_config())?
        .evaluate(request().with_accuracy(AccuracyMode::Spider))
        .await?;
    assert_eq!(spider.metrics.values(EXECUTION_ACCURACY).unwrap(), &[1.0]);

    // duplicate France rows still count under the general comparison
    let general = Orchestrator::new(thread_config())?.evaluate(request()).await?;
    assert_eq!(general.metrics.values(EXECUTION_ACCURACY).unwrap(), &[0.0]);
    Ok(())
}
