use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sqleval::{
    load_metric_definitions, AccuracyMode, EvalConfig, IsolationMode, Orchestrator, SampleSet,
    SchemaCatalog,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the predictions of a samples file
    Run(RunArgs),
    /// Execute one task read from stdin and write its outcome to stdout
    #[command(hide = true)]
    Worker,
}

#[derive(Args)]
struct RunArgs {
    /// JSON array of {id, gold, prediction, db_id, attributes?}
    #[arg(short, long, env = "SQLEVAL_SAMPLES")]
    samples: PathBuf,

    /// Root holding {db_id}/{db_id}.sqlite
    #[arg(short, long, env = "SQLEVAL_DB_DIR")]
    db_dir: PathBuf,

    /// Spider/BIRD tables.json enabling exact match
    #[arg(short, long, env = "SQLEVAL_TABLES_JSON")]
    tables_json: Option<PathBuf>,

    /// JSON array of {name, rule_definition, description?}
    #[arg(short, long, env = "SQLEVAL_METRICS")]
    metrics: Option<PathBuf>,

    /// Spider-style comparison: ordered rows when the gold query sorts, exact match
    #[arg(long)]
    spider: bool,

    /// Skip the valid efficiency score
    #[arg(long)]
    no_ves: bool,

    /// JSON file with evaluation settings
    #[arg(short, long, env = "SQLEVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Concurrent execution units; 0 uses every available core
    #[arg(long, env = "SQLEVAL_NUM_CPU")]
    num_cpu: Option<usize>,

    /// Per-statement timeout in seconds for correctness
    #[arg(long, env = "SQLEVAL_META_TIME_OUT")]
    meta_time_out: Option<f64>,

    /// Per-statement timeout in seconds for efficiency trials
    #[arg(long, env = "SQLEVAL_VES_TIME_OUT")]
    ves_time_out: Option<f64>,

    /// Timing trials per query for the efficiency score
    #[arg(long, env = "SQLEVAL_ITERATE_NUM")]
    iterate_num: Option<usize>,

    /// Run tasks on threads instead of worker processes
    #[arg(long)]
    threads: bool,
}

impl RunArgs {
    fn config(&self) -> Result<EvalConfig> {
        let mut config = match &self.config {
            Some(path) => EvalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EvalConfig::default(),
        };
        if let Some(num_cpu) = self.num_cpu {
            config = config.with_num_cpu(if num_cpu == 0 { num_cpus::get() } else { num_cpu });
        }
        if let Some(secs) = self.meta_time_out {
            config = config.with_meta_time_out(secs);
        }
        if let Some(secs) = self.ves_time_out {
            config = config.with_ves_time_out(secs);
        }
        if let Some(trials) = self.iterate_num {
            config = config.with_iterate_num(trials);
        }
        if self.threads {
            config = config.with_isolation(IsolationMode::Thread);
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.config()?;
    let samples = SampleSet::from_json_file(&args.samples)
        .with_context(|| format!("Failed to load samples {}", args.samples.display()))?;
    let count = samples.len();
    info!(samples = count, "loaded samples");

    let accuracy = if args.spider {
        AccuracyMode::Spider
    } else {
        AccuracyMode::General
    };
    let mut request = samples
        .into_request(&args.db_dir)
        .with_accuracy(accuracy)
        .with_efficiency(!args.no_ves);
    if let Some(path) = &args.tables_json {
        let tables = SchemaCatalog::from_path(path)
            .with_context(|| format!("Failed to load schema {}", path.display()))?;
        request = request.with_tables(tables);
    }
    if let Some(path) = &args.metrics {
        let formulas = load_metric_definitions(path)
            .with_context(|| format!("Failed to load metric definitions {}", path.display()))?;
        request = request.with_formulas(formulas);
    }

    let report = Orchestrator::new(config)?.evaluate(request).await?;
    for error in &report.formula_errors {
        warn!("{}", error);
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report {}", path.display()))?;
            println!("Evaluated {} samples", count);
            for series in report.metrics.iter() {
                println!("{}: {:.4}", series.name, series.mean().unwrap_or_default());
            }
            println!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Worker => {
            init_tracing("warn");
            sqleval::sqleval_db::serve(std::io::stdin().lock(), std::io::stdout().lock())?;
        }
        Commands::Run(args) => {
            init_tracing("info");
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(run(args))?;
        }
    }

    Ok(())
}
