//! Compute cluster sizes, quartiles and uniqueness.

use std::process::ExitCode;

use clap::Parser;
use cluster_analytics::cli::{compute_quartiles, QuartilesArgs};
use player_stats::stage;

fn main() -> ExitCode {
    let args = QuartilesArgs::parse();
    if let Err(err) = player_stats::logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("compute-quartiles", compute_quartiles(&args))
}
