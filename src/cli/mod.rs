// src/cli/mod.rs

use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::str::FromStr;

pub mod output;
pub mod run;

/// Single-dash, multi-letter flags and the long flags they stand for.
///
/// Clap would read `-tL` as `-t L`, so these are rewritten before parsing.
const LEGACY_FLAGS: &[(&str, &str)] = &[
    ("-tL", "--target-list"),
    ("-eL", "--exclude-list"),
    ("-cL", "--command-list"),
    ("-rp", "--real-port"),
    ("-pL", "--proxy-list"),
    ("-threads", "--threads"),
    ("-timeout", "--timeout"),
    ("-random", "--random"),
];

/// Flags whose next argument is a value, in the form they take after normalization.
const VALUE_FLAGS: &[&str] = &[
    "-t",
    "--target",
    "--target-list",
    "-e",
    "--exclude",
    "--exclude-list",
    "-c",
    "--command",
    "--command-list",
    "-p",
    "--port",
    "--real-port",
    "--proto",
    "--proxy-list",
    "--random",
    "-o",
    "--output",
    "--threads",
    "--timeout",
    "--repeat",
    "--config",
];

/// interweave: fans command templates out across targets and runs them in parallel.
#[derive(Parser, Debug)]
#[command(
    name = "interweave",
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(group(ArgGroup::new("targets").required(true).args(["target", "target_list"])))]
#[command(group(ArgGroup::new("exclusions").args(["exclude", "exclude_list"])))]
#[command(group(ArgGroup::new("commands").required(true).args(["command", "command_list"])))]
pub struct Cli {
    /// Target specification: host, IP, CIDR, dash range or glob; comma separated.
    #[arg(short = 't', long, value_name = "SPEC")]
    pub target: Option<String>,

    /// File of target specifications, one per line (`-tL`).
    #[arg(long, value_name = "FILE")]
    pub target_list: Option<PathBuf>,

    /// Exclusion specification, same notation as targets.
    #[arg(short = 'e', long, value_name = "SPEC")]
    pub exclude: Option<String>,

    /// File of exclusion specifications, one per line (`-eL`).
    #[arg(long, value_name = "FILE")]
    pub exclude_list: Option<PathBuf>,

    /// A single command template.
    #[arg(short = 'c', long, value_name = "TEMPLATE", allow_hyphen_values = true)]
    pub command: Option<String>,

    /// File of command templates, one per line (`-cL`).
    #[arg(long, value_name = "FILE")]
    pub command_list: Option<PathBuf>,

    /// Ports for `_port_`: comma list, `start-end` range or a single port.
    #[arg(short = 'p', long, value_name = "PORTS")]
    pub port: Option<String>,

    /// Ports for `_realport_`, same notation as `-p` (`-rp`).
    #[arg(long, value_name = "PORTS")]
    pub real_port: Option<String>,

    /// Comma-separated protocols for `_proto_`.
    #[arg(long, value_name = "PROTOCOLS")]
    pub proto: Option<String>,

    /// File of proxies for `_proxy_`, assigned round-robin (`-pL`).
    #[arg(long, value_name = "FILE")]
    pub proxy_list: Option<PathBuf>,

    /// Directory holding the files `_random_` is picked from.
    #[arg(long, value_name = "DIR")]
    pub random: Option<PathBuf>,

    /// Value for `_output_`.
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: Option<String>,

    /// Maximum number of concurrent tasks [default: 5].
    #[arg(long, value_name = "N", value_parser = positive::<usize>)]
    pub threads: Option<usize>,

    /// Per-command timeout in seconds [default: 600].
    #[arg(long, value_name = "SECONDS", value_parser = positive::<u64>)]
    pub timeout: Option<u64>,

    /// Treat `/` notation as literal text instead of a CIDR block.
    #[arg(long)]
    pub no_cidr: bool,

    /// Do not draw the progress bar.
    #[arg(long, alias = "sober")]
    pub no_bar: bool,

    /// Run every generated task this many times.
    #[arg(long, value_name = "N", default_value_t = 1, value_parser = positive::<usize>)]
    pub repeat: usize,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Print every command as it starts and enable debug logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Discard command output and suppress the banner and informational lines.
    /// Errors are still printed.
    #[arg(long)]
    pub silent: bool,

    /// Configuration file to use instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,
}

/// Rewrites legacy single-dash flags (`-tL`, `-threads`, ...) into their long forms.
///
/// Both `-tL file` and `-tL=file` are accepted. The value following a flag is never
/// rewritten, so `-c -threads` keeps `-threads` as the command. Nothing after a bare `--`
/// is touched.
pub fn normalize_legacy_flags<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut passthrough = false;
    let mut expects_value = false;
    args.into_iter()
        .map(|arg| {
            let arg: String = arg.into();
            if passthrough {
                return arg;
            }
            if std::mem::take(&mut expects_value) {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                return arg;
            }
            let (flag, value) = match arg.split_once('=') {
                Some((flag, value)) => (flag, Some(value)),
                None => (arg.as_str(), None),
            };
            let normalized = match LEGACY_FLAGS.iter().find(|(legacy, _)| *legacy == flag) {
                Some((_, long)) => match value {
                    Some(value) => format!("{long}={value}"),
                    None => (*long).to_string(),
                },
                None => arg,
            };
            expects_value = VALUE_FLAGS.contains(&normalized.as_str());
            normalized
        })
        .collect()
}

/// Parses a strictly positive integer.
fn positive<T>(text: &str) -> Result<T, String>
where
    T: FromStr + Default + PartialEq,
{
    match text.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(format!("'{text}' is not a positive integer")),
    }
}
