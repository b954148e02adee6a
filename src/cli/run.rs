// src/cli/run.rs

use crate::{
    cli::{Cli, output::TerminalReporter},
    constants::{DEFAULT_THREADS, DEFAULT_TIMEOUT},
    core::{
        address_resolver, compiler,
        config_loader::FileConfig,
        interpolator::{self, Bindings},
        parameters,
        worker_pool::{PoolError, WorkerPool},
    },
    models::RunSummary,
    system::shell::Shell,
};
use anyhow::{Context, Result};
use std::{fs, path::Path, sync::Arc, time::Duration};

/// Run settings after merging command-line flags over the configuration file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub threads: usize,
    pub timeout: Duration,
    pub shell: Shell,
    pub cidr: bool,
    pub show_bar: bool,
    pub verbose: bool,
    pub silent: bool,
}

impl Settings {
    /// Flags win over the file, the file wins over built-in defaults.
    pub fn merge(cli: &Cli, file: &FileConfig) -> Result<Self> {
        let shell = Shell::resolve(file.shell.as_deref()).context("Invalid shell configuration")?;
        Ok(Self {
            threads: cli.threads.or(file.threads).unwrap_or(DEFAULT_THREADS),
            timeout: cli
                .timeout
                .or(file.timeout)
                .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
            shell,
            cidr: !(cli.no_cidr || file.no_cidr),
            show_bar: !(cli.no_bar || file.no_bar),
            verbose: cli.verbose || file.verbose,
            silent: cli.silent || file.silent,
        })
    }
}

/// Runs the whole pipeline: resolution, compilation, expansion and execution.
///
/// Every input is validated before the first task starts. The returned summary records
/// task failures; it is an `Err` only for configuration errors.
pub fn handle(cli: Cli, file: FileConfig) -> Result<RunSummary> {
    let settings = Settings::merge(&cli, &file)?;
    log::debug!("Effective settings: {:?}", settings);

    // --- 1. Targets ---
    let targets = read_specs(cli.target.as_deref(), cli.target_list.as_deref())?;
    let exclusions = read_specs(cli.exclude.as_deref(), cli.exclude_list.as_deref())?;
    let addresses = address_resolver::resolve(&targets, &exclusions, settings.cidr)?;
    let target_count = addresses.len();

    // --- 2. Templates ---
    let templates = read_specs(cli.command.as_deref(), cli.command_list.as_deref())?;
    let tasks = compiler::compile(&templates)?;

    // --- 3. Variable values ---
    let mut bindings = Bindings::new(addresses)
        .with_repeat(cli.repeat)
        .with_silent(settings.silent);
    if let Some(spec) = &cli.port {
        bindings = bindings.with_ports(parameters::parse_ports(spec)?);
    }
    if let Some(spec) = &cli.real_port {
        bindings = bindings.with_real_ports(parameters::parse_ports(spec)?);
    }
    if let Some(spec) = &cli.proto {
        bindings = bindings.with_protocols(parameters::parse_protocols(spec)?);
    }
    if let Some(path) = &cli.proxy_list {
        bindings = bindings.with_proxies(parameters::parse_proxies(&read_lines(path)?)?);
    }
    if let Some(dir) = &cli.random {
        bindings = bindings.with_random(parameters::pick_random_file(dir)?);
    }
    if let Some(output) = &cli.output {
        bindings = bindings.with_output(output.clone());
    }

    // --- 4. Execution ---
    let expansion = interpolator::expand(tasks, bindings)?;
    if expansion.count == 0 {
        return Err(PoolError::EmptyQueue.into());
    }

    let reporter = Arc::new(TerminalReporter::new(
        settings.show_bar,
        settings.verbose,
        settings.silent,
    ));
    let pool = WorkerPool::new(settings.threads, settings.timeout, settings.shell.clone())?
        .with_reporter(reporter.clone());
    reporter.print_banner(
        target_count,
        expansion.count,
        settings.threads.min(expansion.count),
        settings.timeout,
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let summary = runtime.block_on(async move {
        let shutdown = pool.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received; stopping the run.");
                shutdown.cancel();
            }
        });
        pool.run(expansion).await
    })?;

    log::debug!(
        "Run finished: {} completed, {} skipped, {} failed.",
        summary.completed,
        summary.skipped,
        summary.failures.len()
    );
    Ok(summary)
}

/// Collects specifications from a single value or a file, whichever was given.
fn read_specs(single: Option<&str>, list: Option<&Path>) -> Result<Vec<String>> {
    match (single, list) {
        (Some(value), _) => Ok(vec![value.trim().to_string()]),
        (None, Some(path)) => read_lines(path),
        (None, None) => Ok(Vec::new()),
    }
}

/// Reads a file into trimmed, non-empty lines.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file '{}'", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
