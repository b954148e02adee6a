// src/cli/output.rs

use crate::{
    core::worker_pool::Reporter,
    models::{Command, RunSummary, Task},
    system::executor::ExecutionError,
};
use chrono::Local;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::{fmt, time::Duration};

/// The severity tag of a terminal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Verbose,
    Thread,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::Verbose => "VERBOSE".cyan(),
            Self::Thread => "THREAD".green(),
            Self::Error => "ERROR".red().bold(),
        };
        write!(f, "{}", tag)
    }
}

/// Formats `[HH:MM:SS] [LEVEL] [command] message`.
pub fn format_line(timestamp: &str, level: Level, command: &str, message: &str) -> String {
    format!(
        "{} [{}] [{}] {}",
        format!("[{}]", timestamp).bright_black(),
        level,
        command.yellow(),
        message
    )
}

/// Captured stdout as printed: unchanged, newline-terminated.
pub fn format_output(stdout: &str) -> String {
    if stdout.ends_with('\n') {
        stdout.to_string()
    } else {
        format!("{}\n", stdout)
    }
}

/// Reports a running pool on the terminal: per-command lines, errors and a progress bar.
///
/// Lines are printed through the bar so they never tear its rendering.
pub struct TerminalReporter {
    bar: ProgressBar,
    verbose: bool,
    silent: bool,
}

impl TerminalReporter {
    pub fn new(show_bar: bool, verbose: bool, silent: bool) -> Self {
        let bar = if show_bar {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} ({eta})",
            ) {
                bar.set_style(style.progress_chars("■■□"));
            }
            bar
        } else {
            ProgressBar::hidden()
        };
        Self {
            bar,
            verbose,
            silent,
        }
    }

    /// Prints the startup banner, unless running silently.
    pub fn print_banner(&self, targets: usize, tasks: usize, threads: usize, timeout: Duration) {
        if self.silent {
            return;
        }
        let rule = "=".repeat(60).bright_black();
        println!("{}", rule);
        println!(
            "{} {}",
            env!("CARGO_PKG_NAME").bold().cyan(),
            env!("CARGO_PKG_VERSION").bright_black()
        );
        println!("{}", rule);
        println!("{:<10} {}", "Targets".bold(), targets);
        println!("{:<10} {}", "Tasks".bold(), tasks);
        println!("{:<10} {}", "Threads".bold(), threads);
        println!("{:<10} {}s", "Timeout".bold(), timeout.as_secs());
        println!("{}", rule);
    }

    fn line(&self, level: Level, command: &str, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S").to_string();
        let text = format_line(&timestamp, level, command, message);
        self.bar.suspend(|| match level {
            Level::Error => eprintln!("{}", text),
            _ => println!("{}", text),
        });
    }
}

impl Reporter for TerminalReporter {
    fn run_started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(Duration::from_millis(120));
    }

    fn command_started(&self, command: &Command) {
        if self.verbose && !self.silent {
            self.line(Level::Thread, &command.text, "Started");
        }
    }

    fn command_output(&self, _command: &Command, stdout: &str) {
        let text = format_output(stdout);
        self.bar.suspend(|| print!("{}", text));
    }

    fn command_finished(&self, command: &Command, error: Option<&ExecutionError>) {
        match error {
            Some(ExecutionError::Interrupted(_)) => {}
            Some(error) => self.line(Level::Error, &command.text, &error.to_string()),
            None if self.verbose && !self.silent => {
                self.line(Level::Verbose, &command.text, "Finished")
            }
            None => {}
        }
    }

    fn task_completed(&self, _task: &Task) {
        self.bar.inc(1);
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.bar.finish_and_clear();
        if self.silent {
            return;
        }

        let failures = summary.failures.len();
        let headline = format!("Completed {}/{} task(s)", summary.completed, summary.total);
        let failed = format!("{} failure(s)", failures);
        println!(
            "{}, {}.",
            headline.bold(),
            if failures == 0 {
                failed.green()
            } else {
                failed.red()
            }
        );
        if summary.cancelled {
            println!(
                "{}",
                format!("Interrupted: {} queued task(s) skipped.", summary.skipped).yellow()
            );
        }
    }
}
