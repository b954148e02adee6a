// src/constants.rs

use std::time::Duration;

// --- Template Variables ---

/// Replaced by each resolved target.
pub const TARGET_VAR: &str = "_target_";

/// Alias of [`TARGET_VAR`], replaced by the same value.
pub const HOST_VAR: &str = "_host_";

/// Replaced by the target with its scheme and slashes normalized.
pub const CLEAN_TARGET_VAR: &str = "_cleantarget_";

/// Replaced by each value of the `-p` port specification.
pub const PORT_VAR: &str = "_port_";

/// Replaced by each value of the `-rp` real-port specification.
pub const REAL_PORT_VAR: &str = "_realport_";

/// Replaced by each protocol of the `--proto` list.
pub const PROTO_VAR: &str = "_proto_";

/// Replaced by a proxy, assigned round-robin from the proxy list.
pub const PROXY_VAR: &str = "_proxy_";

/// Replaced by one file picked at random from the `-random` directory.
pub const RANDOM_VAR: &str = "_random_";

/// Replaced by the `-o` output directory value.
pub const OUTPUT_VAR: &str = "_output_";

/// Every variable that fans a task out across the target set.
pub const TARGET_FAMILY: &[&str] = &[TARGET_VAR, HOST_VAR, CLEAN_TARGET_VAR];

// --- Block Syntax ---

/// Synchronization marker. Must appear as a whole trimmed line.
pub const BLOCKER_MARKER: &str = "_blocker_";

// --- Defaults ---

/// Default maximum number of concurrent workers.
pub const DEFAULT_THREADS: usize = 5;

/// Default per-task timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Queue slots allotted to every worker between the producer and the pool.
pub const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Shell used when neither the configuration nor `$SHELL` names one.
pub const FALLBACK_SHELL: &str = "/bin/sh";

// --- Configuration Files ---

/// The name of the directory holding interweave configuration (inside the user config dir).
pub const CONFIG_DIR_NAME: &str = "interweave";

/// The name of the configuration file.
pub const CONFIG_FILENAME: &str = "config.toml";
