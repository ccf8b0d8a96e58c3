//! Assemble the front-end app bundle.

use std::process::ExitCode;

use clap::Parser;
use cluster_analytics::cli::{build_appdata, AppDataArgs};
use player_stats::stage;

fn main() -> ExitCode {
    let args = AppDataArgs::parse();
    if let Err(err) = player_stats::logging::init_tracing(args.log_file.as_deref()) {
        eprintln!("error: cannot open log file: {err}");
        return ExitCode::from(stage::EXIT_FAILURE);
    }
    stage::finish("build-appdata", build_appdata(&args))
}
