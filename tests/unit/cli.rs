use super::Fixture;
use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;

fn samples() -> serde_json::Value {
    json!([
        {"id": 2, "gold": "SELECT a FROM t", "prediction": "SELECT b FROM t", "db_id": "tiny",
         "attributes": {"difficulty": "easy"}},
        {"id": 1, "gold": "SELECT a FROM t", "prediction": "SELECT a FROM t", "db_id": "tiny",
         "attributes": {"difficulty": "hard"}}
    ])
}

#[test]
fn test_run_prints_report() -> Result<()> {
    let fixture = Fixture::new()?;
    let samples = fixture.write_json("samples.json", &samples())?;

    Command::cargo_bin("sqleval")?
        .args(["run", "--no-ves", "--iterate-num", "3", "-s"])
        .arg(&samples)
        .arg("-d")
        .arg(fixture.db_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains("execution_accuracy"))
        .stdout(predicate::str::contains("valid_efficiency_score").not());
    Ok(())
}

#[test]
fn test_run_writes_report_with_derived_metrics() -> Result<()> {
    let fixture = Fixture::new()?;
    let samples = fixture.write_json("samples.json", &samples())?;
    let metrics = fixture.write_json(
        "metrics.json",
        &json!([{
            "name": "hard_ex",
            "rule_definition": "execution_accuracy if samples_attrs['difficulty'] == 'hard' else 0",
            "description": "execution accuracy on hard samples"
        }]),
    )?;
    let output = fixture.db_dir().join("report.json");

    Command::cargo_bin("sqleval")?
        .args(["run", "--threads", "--iterate-num", "3", "-s"])
        .arg(&samples)
        .arg("-d")
        .arg(fixture.db_dir())
        .arg("-m")
        .arg(&metrics)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Evaluated 2 samples"))
        .stdout(predicate::str::contains("hard_ex: 0.5000"))
        .stdout(predicate::str::contains("Report written to"));

    let report: serde_json::Value = serde_json::from_slice(&std::fs::read(&output)?)?;
    // samples are reordered by id: id 1 is the correct hard one
    assert_eq!(
        report["metrics"]["execution_accuracy"],
        json!([1.0, 0.0])
    );
    assert_eq!(report["metrics"]["hard_ex"], json!([1.0, 0.0]));
    Ok(())
}

#[test]
fn test_duplicate_sample_ids_fail() -> Result<()> {
    let fixture = Fixture::new()?;
    let samples = fixture.write_json(
        "samples.json",
        &json!([
            {"id": 1, "gold": "SELECT 1", "prediction": "SELECT 1", "db_id": "tiny"},
            {"id": 1, "gold": "SELECT 2", "prediction": "SELECT 2", "db_id": "tiny"}
        ]),
    )?;

    Command::cargo_bin("sqleval")?
        .args(["run", "-s"])
        .arg(&samples)
        .arg("-d")
        .arg(fixture.db_dir())
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate sample id 1"));
    Ok(())
}

#[test]
fn test_worker_executes_one_task() -> Result<()> {
    let fixture = Fixture::new()?;
    let builder = sqleval::task::TaskBuilder::new(fixture.db_dir());
    let pairs = builder.pairs(
        &["SELECT a FROM t".to_string()],
        &["SELECT a FROM t ORDER BY a".to_string()],
        &["tiny".to_string()],
    )?;
    let task = builder.task(
        &pairs[0],
        std::time::Duration::from_secs(5),
        sqleval::TaskMode::Correctness {
            order_sensitive: false,
        },
    );

    Command::cargo_bin("sqleval")?
        .arg("worker")
        .write_stdin(serde_json::to_vec(&task)?)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"correct\":true"));
    Ok(())
}

#[test]
fn test_worker_rejects_garbage() -> Result<()> {
    Command::cargo_bin("sqleval")?
        .arg("worker")
        .write_stdin("not json")
        .assert()
        .failure();
    Ok(())
}
