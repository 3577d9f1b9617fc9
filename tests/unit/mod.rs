use anyhow::Result;
use rusqlite::Connection;
use serde_json::json;
use sqleval::{EvalConfig, IsolationMode};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

mod cli;
mod exact;
mod formulas;
mod ordering;
mod scenarios;

/// Temporary `{root}/{db_id}/{db_id}.sqlite` tree with two databases:
/// `tiny` (one two-row table) and `concert` (singers and their concerts).
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;

        let tiny = create_db(dir.path(), "tiny")?;
        tiny.execute_batch(
            "CREATE TABLE t (a INTEGER, b TEXT);
             INSERT INTO t VALUES (1, 'x'), (2, 'y');",
        )?;

        let concert = create_db(dir.path(), "concert")?;
        concert.execute_batch(
            "CREATE TABLE singer (singer_id INTEGER PRIMARY KEY, name TEXT, country TEXT, age INTEGER);
             CREATE TABLE singer_in_concert (concert_id INTEGER, singer_id INTEGER REFERENCES singer(singer_id));
             INSERT INTO singer VALUES
                (1, 'Joe', 'France', 52), (2, 'Tribal', 'Netherlands', 29),
                (3, 'Timbaland', 'United States', 43), (4, 'Rose', 'France', 41);
             INSERT INTO singer_in_concert VALUES (1, 1), (1, 3), (2, 4), (3, 1);",
        )?;

        Ok(Self { dir })
    }

    pub fn db_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_json(&self, name: &str, value: &serde_json::Value) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, serde_json::to_vec_pretty(value)?)?;
        Ok(path)
    }

    pub fn tables_json(&self) -> serde_json::Value {
        json!([{
            "db_id": "concert",
            "table_names_original": ["singer", "singer_in_concert"],
            "column_names_original": [
                [-1, "*"],
                [0, "singer_id"], [0, "name"], [0, "country"], [0, "age"],
                [1, "concert_id"], [1, "singer_id"]
            ],
            "foreign_keys": [[6, 1]]
        }])
    }
}

fn create_db(root: &Path, db_id: &str) -> Result<Connection> {
    let dir = root.join(db_id);
    std::fs::create_dir_all(&dir)?;
    Ok(Connection::open(dir.join(format!("{}.sqlite", db_id)))?)
}

/// Small, fast settings running tasks in `sqleval worker` subprocesses.
pub fn process_config() -> EvalConfig {
    EvalConfig::default()
        .with_num_cpu(4)
        .with_meta_time_out(5.0)
        .with_ves_time_out(5.0)
        .with_iterate_num(5)
        .with_isolation(IsolationMode::Process {
            program: Some(PathBuf::from(env!("CARGO_BIN_EXE_sqleval"))),
        })
}

pub fn thread_config() -> EvalConfig {
    process_config().with_isolation(IsolationMode::Thread)
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// An unbounded recursive query only an interrupt or a kill can stop.
pub const ENDLESS_QUERY: &str =
    "WITH RECURSIVE r(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM r) SELECT count(*) FROM r";
