//! Load players and their cluster ids into the document store.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cluster_analytics::ClusterAssignments;
use player_stats::stage::{self, StageOutcome};
use player_stats::{PipelineConfig, StatsTable};
use player_store::{build_documents, PostgresDocumentStore, StoreConfig, StoreWriter, WriteMode};
use tracing::info;

/// Build the per-player document collection
#[derive(Parser)]
#[command(name = "build-appdb")]
struct Args {
    /// Cleaned stats CSV
    #[arg(long)]
    stats_file: PathBuf,

    /// Player-clusters CSV written by `assign-clusters`
    #[arg(long)]
    clusterids_file: PathBuf,

    /// Database URL (defaults to $DATABASE_URL)
    #[arg(long, alias = "mongo-url")]
    db_url: Option<String>,

    /// Collection (table) name
    #[arg(long, default_value = "players")]
    collection: String,

    /// Documents per upsert
    #[arg(long, default_value_t = player_store::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Pipeline config; every configured split must have a cluster column
    #[arg(long)]
    params_file: Option<PathBuf>,

    /// Clear an incomplete collection and rewrite it
    #[arg(long, conflicts_with = "resume")]
    drop: bool,

    /// Continue a partial collection from the first missing player
    #[arg(long)]
    resume: bool,

    #[arg(long)]
    log_file: Option<PathBuf>,
}

async fn run(args: Args) -> Result<StageOutcome> {
    let mut config = StoreConfig::from_env();
    if let Some(url) = args.db_url {
        config.db_url = url;
    }
    config.collection = args.collection;
    config.batch_size = args.batch_size;

    let pipeline = PipelineConfig::load_or_default(args.params_file.as_deref()).context("load pipeline config")?;
    let splits: Vec<String> = pipeline.splits.iter().map(|s| s.name.clone()).collect();

    let table = StatsTable::load_cleaned(&args.stats_file)
        .with_context(|| format!("load stats table {}", args.stats_file.display()))?;
    let assignments = ClusterAssignments::read(&args.clusterids_file)
        .with_context(|| format!("read clusters {}", args.clusterids_file.display()))?;
    let docs = build_documents(&table, &assignments, &splits)?;
    info!("Prepared {} player documents", docs.len());

    let store = PostgresDocumentStore::connect(&config).await.context("connect to document store")?;
    let mode = match (args.drop, args.resume) {
        (true, _) => WriteMode::Drop,
        (_, true) => WriteMode::Resume,
        _ => WriteMode::Fresh,
    };
    Ok(StoreWriter::new(&store, config.batch_size).write_all(&docs, mode).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = player_stats::logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("build-appdb", run(args).await)
}
