//! Project each split's centroids to 3D.

use std::process::ExitCode;

use clap::Parser;
use cluster_analytics::cli::{dim_reduce, DimReduceArgs};
use player_stats::stage;

fn main() -> ExitCode {
    let args = DimReduceArgs::parse();
    if let Err(err) = player_stats::logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("dim-reduce", dim_reduce(&args))
}
