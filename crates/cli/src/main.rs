//! deckflow CLI entry point.

use std::{process, str::FromStr};

use clap::Parser;
use log::LevelFilter;

use deckflow_cli::Args;

fn main() {
    let args = Args::parse();

    let log_level = LevelFilter::from_str(&args.log_level).unwrap_or_else(|_| {
        eprintln!(
            "Invalid log level: {}. Using 'warn' instead.",
            args.log_level
        );
        LevelFilter::Warn
    });
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(log_level)
        .init();

    if let Err(err) = deckflow_cli::run(&args) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}
