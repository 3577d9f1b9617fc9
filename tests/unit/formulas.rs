use super::{strings, thread_config, Fixture};
use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::json;
use sqleval::{
    EvaluationRequest, FreeVariable, MetricFormula, Orchestrator, EXECUTION_ACCURACY,
};

fn request(fixture: &Fixture) -> EvaluationRequest {
    EvaluationRequest::new(
        strings(&["SELECT a FROM t", "SELECT b FROM t", "SELECT a FROM t ORDER BY a DESC"]),
        strings(&["SELECT a FROM t", "SELECT a FROM t", "SELECT a FROM t"]),
        strings(&["tiny", "tiny", "tiny"]),
        fixture.db_dir(),
    )
    .with_efficiency(false)
    .with_attributes(vec![
        json!({"difficulty": "hard"}),
        json!({"difficulty": "easy"}),
        json!({"difficulty": "easy"}),
    ])
}

#[tokio::test]
async fn test_derived_metrics_are_added() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = request(&fixture).with_formulas(vec![
        MetricFormula::new("copy", "execution_accuracy"),
        MetricFormula::new(
            "easy_ex",
            "execution_accuracy if samples_attrs['difficulty'] == 'easy' else 0",
        ),
    ]);

    let report = Orchestrator::new(thread_config())?.evaluate(request).await?;

    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[1.0, 0.0, 1.0]);
    assert_eq!(report.metrics.values("copy").unwrap(), &[1.0, 0.0, 1.0]);
    assert_eq!(report.metrics.values("easy_ex").unwrap(), &[0.0, 0.0, 1.0]);
    assert!(report.formula_errors.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_broken_formula_only_drops_its_metric() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = request(&fixture).with_formulas(vec![
        MetricFormula::new("broken", "execution_accuracy + foo"),
        MetricFormula::new("narrow", "execution_accuracy")
            .with_variables([FreeVariable::SamplesAttrs]),
        MetricFormula::new("doubled", "execution_accuracy * 2"),
    ]);

    let report = Orchestrator::new(thread_config())?.evaluate(request).await?;

    assert!(!report.metrics.contains("broken"));
    assert!(!report.metrics.contains("narrow"));
    assert_eq!(report.metrics.values("doubled").unwrap(), &[2.0, 0.0, 2.0]);
    assert_eq!(report.metrics.values(EXECUTION_ACCURACY).unwrap(), &[1.0, 0.0, 1.0]);

    let failed: Vec<&str> = report
        .formula_errors
        .iter()
        .map(|e| e.metric.as_str())
        .collect();
    assert_eq!(failed, vec!["broken", "narrow"]);
    assert!(report.formula_errors[0].to_string().contains("broken"));
    Ok(())
}

#[tokio::test]
async fn test_attribute_count_must_match_samples() -> Result<()> {
    let fixture = Fixture::new()?;
    let request = request(&fixture).with_attributes(vec![json!({})]);
    let result = Orchestrator::new(thread_config())?.evaluate(request).await;
    assert!(result.is_err());
    Ok(())
}
