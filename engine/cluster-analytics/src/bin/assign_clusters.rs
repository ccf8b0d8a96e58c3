//! Label every player with its nearest centroid in each split.

use std::process::ExitCode;

use clap::Parser;
use cluster_analytics::cli::{assign_clusters, AssignArgs};
use player_stats::stage;

fn main() -> ExitCode {
    let args = AssignArgs::parse();
    if let Err(err) = player_stats::logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("assign-clusters", assign_clusters(&args))
}
