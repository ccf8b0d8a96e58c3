//! Turn raw scrape output into the cleaned stats table.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use player_stats::stage::{self, StageOutcome};
use player_stats::table::{read_scrape_rows, StatsTable};
use tracing::info;

/// Deduplicate, sort and re-rank scraped hiscores rows
#[derive(Parser)]
#[command(name = "clean-stats")]
struct Args {
    /// Raw scrape CSV written by `scrape`
    #[arg(long)]
    in_file: PathBuf,

    /// Cleaned stats CSV to write
    #[arg(long)]
    out_file: PathBuf,

    /// Rebuild even when the output is newer than the input
    #[arg(long)]
    force: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn run(args: &Args) -> Result<StageOutcome> {
    if !args.force && stage::is_up_to_date(&args.out_file, &[&args.in_file]) {
        return Ok(StageOutcome::NothingToDo);
    }

    let rows = read_scrape_rows(&args.in_file)
        .with_context(|| format!("read scrape rows from {}", args.in_file.display()))?;
    info!("Read {} raw rows", rows.len());

    let table = StatsTable::clean(rows);
    table
        .write_cleaned(&args.out_file)
        .with_context(|| format!("write {}", args.out_file.display()))?;

    info!("Wrote {} cleaned players to {}", table.len(), args.out_file.display());
    Ok(StageOutcome::Completed)
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = player_stats::logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("clean-stats", run(&args))
}
