//! Print one player's document as JSON.

use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;
use player_stats::stage::{self, StageOutcome};
use player_store::{lookup, PostgresDocumentStore, StoreConfig};

/// Case-insensitive lookup of a player in the document store
#[derive(Parser)]
#[command(name = "lookup-player")]
struct Args {
    username: String,

    /// Database URL (defaults to $DATABASE_URL)
    #[arg(long, alias = "mongo-url")]
    db_url: Option<String>,

    #[arg(long, default_value = "players")]
    collection: String,
}

async fn run(args: Args) -> Result<StageOutcome> {
    let mut config = StoreConfig::from_env();
    if let Some(url) = args.db_url {
        config.db_url = url;
    }
    config.collection = args.collection;
    config.max_connections = 1;

    let store = PostgresDocumentStore::connect(&config).await?;
    let doc = lookup(&store, &args.username).await?.ok_or_else(|| anyhow!("no player named {:?}", args.username))?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(StageOutcome::Completed)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = player_stats::logging::init_tracing(None) {
        eprintln!("error: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("lookup-player", run(args).await)
}
