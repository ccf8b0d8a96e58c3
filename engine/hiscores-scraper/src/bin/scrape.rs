//! Scrape a rank range of the overall hiscores into a raw CSV.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hiscores_scraper::config::MAX_STATS_WORKERS;
use hiscores_scraper::{ScrapeDriver, ScrapeRequest, ScraperConfig, VpnHook};
use player_stats::stage::{self, StageOutcome};
use tracing::info;

/// Scrape player stats for a range of leaderboard ranks
#[derive(Parser)]
#[command(name = "scrape")]
struct Args {
    /// First rank to scrape
    #[arg(long, default_value_t = 1)]
    start_rank: u64,

    /// Last rank to scrape (inclusive)
    #[arg(long)]
    stop_rank: u64,

    /// Raw CSV to append to; an existing file is resumed
    #[arg(long)]
    out_file: PathBuf,

    /// Number of stats workers
    #[arg(long, default_value_t = 28)]
    num_workers: usize,

    /// Reset the IP address and restart after block events
    #[arg(long)]
    vpn: bool,

    /// JSON scraper config; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

async fn run(args: &Args) -> Result<StageOutcome> {
    let config = match &args.config {
        Some(path) => {
            ScraperConfig::load(path).with_context(|| format!("load {}", path.display()))?.with_env_overrides()
        }
        None => ScraperConfig::from_env(),
    };

    let max_workers = config.max_stats_workers();
    if args.num_workers == 0 || args.num_workers > max_workers {
        bail!("--num-workers must be between 1 and {} (hard cap {})", max_workers, MAX_STATS_WORKERS);
    }
    let config = config.with_stats_workers(args.num_workers);

    let mut driver = ScrapeDriver::new(config.clone())?;
    if args.vpn {
        let Some(command) = config.vpn_command.as_deref() else {
            bail!("--vpn requires VPN_RESET_COMMAND or vpn_command in the config");
        };
        let hook = VpnHook::try_from(command)?.with_sudo_password_from_env();
        driver = driver.with_vpn(hook);
    }

    let request = ScrapeRequest {
        start_rank: args.start_rank,
        stop_rank: args.stop_rank,
        out_file: args.out_file.clone(),
    };
    info!(
        "Scraping ranks {}..={} into {} with {} stats workers",
        request.start_rank,
        request.stop_rank,
        request.out_file.display(),
        args.num_workers
    );
    Ok(driver.run(&request).await?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = player_stats::logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("scrape", run(&args).await)
}
