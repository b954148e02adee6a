// src/bin/interweave.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use interweave::{
    cli::{Cli, normalize_legacy_flags, run},
    core::config_loader,
};
use std::env;

/// Exit code of a run stopped with Ctrl+C, as a shell would report it.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// The main entry point of `interweave`.
/// It parses arguments, sets up logging and performs centralized error handling.
fn main() {
    let cli = Cli::parse_from(normalize_legacy_flags(env::args()));

    match run_cli(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(INTERRUPTED_EXIT_CODE),
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Runs the pipeline. Returns `Ok(false)` if the run was interrupted.
///
/// Task failures are reported by the run itself and do not make this an error.
fn run_cli(cli: Cli) -> Result<bool> {
    let file = config_loader::load_config(cli.config.as_deref())?;

    let verbose = cli.verbose || file.verbose;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "warn" }),
    )
    .init();
    if cli.no_color || file.no_color {
        colored::control::set_override(false);
    }
    log::debug!("CLI args parsed: {:?}", cli);

    let summary = run::handle(cli, file)?;
    Ok(!summary.cancelled)
}
