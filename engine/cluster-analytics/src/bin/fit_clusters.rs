//! Fit per-split k-means centroids from the cleaned stats table.

use std::process::ExitCode;

use clap::Parser;
use cluster_analytics::cli::{fit_clusters, FitArgs};
use player_stats::stage;

fn main() -> ExitCode {
    let args = FitArgs::parse();
    if let Err(err) = player_stats::logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("fit-clusters", fit_clusters(&args))
}
