//! The main entry point for the `kaeru` command-line application.
//!
//! Sets up logging and hands the arguments to [`kaeru::cli::run`], whose return
//! value becomes the process exit code.

use std::env;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // KAERU_LOG=debug shows prune decisions and per-file outcomes.
    let filter = EnvFilter::try_from_env("KAERU_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    process::exit(kaeru::cli::run(env::args_os()));
}
