//! # Interpolator
//!
//! The variable expansion pipeline. Each stage is a pull-based iterator wrapping the stage
//! before it: it takes one task from upstream and, if the task mentions the stage's variable,
//! yields one clone per replacement value; otherwise it passes the task through once. Only one
//! template per stage is held at a time, so memory stays proportional to the pipeline depth
//! however large the Cartesian product is.
//!
//! Stage order: repeat, targets (`_target_`, `_host_`, `_cleantarget_`), `_port_`,
//! `_realport_`, `_proto_`, `_proxy_`, `_random_`, `_output_`.
//!
//! Instances of one compiled task always come out contiguously and in compile order,
//! which the worker pool relies on to decide when a task node has no more instances.

use crate::constants::{
    CLEAN_TARGET_VAR, HOST_VAR, OUTPUT_VAR, PORT_VAR, PROTO_VAR, PROXY_VAR, RANDOM_VAR,
    REAL_PORT_VAR, TARGET_FAMILY, TARGET_VAR,
};
use crate::models::Task;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A lazy stream of fully substituted tasks.
pub type TaskStream = Box<dyn Iterator<Item = Task> + Send>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExpansionError {
    #[error("No targets to expand commands against.")]
    NoTargets,
    #[error("The repeat count must be at least 1.")]
    InvalidRepeat,
}

/// The replacement values for every template variable.
#[derive(Debug, Clone)]
pub struct Bindings {
    targets: Arc<[String]>,
    ports: Option<Arc<[String]>>,
    real_ports: Option<Arc<[String]>>,
    protocols: Option<Arc<[String]>>,
    proxies: Option<Vec<String>>,
    random: Option<String>,
    output: Option<String>,
    repeat: usize,
    silent: bool,
}

impl Bindings {
    pub fn new<I: IntoIterator<Item = String>>(targets: I) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            ports: None,
            real_ports: None,
            protocols: None,
            proxies: None,
            random: None,
            output: None,
            repeat: 1,
            silent: false,
        }
    }

    pub fn with_ports(mut self, ports: Vec<String>) -> Self {
        self.ports = Some(ports.into());
        self
    }

    pub fn with_real_ports(mut self, real_ports: Vec<String>) -> Self {
        self.real_ports = Some(real_ports.into());
        self
    }

    pub fn with_protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = Some(protocols.into());
        self
    }

    pub fn with_proxies(mut self, proxies: Vec<String>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    pub fn with_random(mut self, random: String) -> Self {
        self.random = Some(random);
        self
    }

    pub fn with_output(mut self, output: String) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_repeat(mut self, repeat: usize) -> Self {
        self.repeat = repeat;
        self
    }

    /// Marks every produced command silent: its stdout is discarded.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// How many concrete instances `task` expands into.
    pub fn multiplicity(&self, task: &Task) -> usize {
        let factor = |values: &Option<Arc<[String]>>, variable: &str| match values {
            Some(values) if task.mentions(variable) => values.len(),
            _ => 1,
        };
        let targets = if task.mentions_any(TARGET_FAMILY) {
            self.targets.len()
        } else {
            1
        };

        self.repeat
            * targets
            * factor(&self.ports, PORT_VAR)
            * factor(&self.real_ports, REAL_PORT_VAR)
            * factor(&self.protocols, PROTO_VAR)
    }
}

/// The announced task count and the stream that yields exactly that many tasks.
pub struct Expansion {
    pub count: usize,
    pub stream: TaskStream,
}

impl fmt::Debug for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expansion")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

/// Builds the expansion pipeline over compiled `tasks`.
pub fn expand(tasks: Vec<Task>, bindings: Bindings) -> Result<Expansion, ExpansionError> {
    if bindings.targets.is_empty() {
        return Err(ExpansionError::NoTargets);
    }
    if bindings.repeat == 0 {
        return Err(ExpansionError::InvalidRepeat);
    }

    let count = tasks.iter().map(|task| bindings.multiplicity(task)).sum();
    log::debug!("Expansion of {} compiled task(s) yields {} task(s).", tasks.len(), count);

    let Bindings {
        targets,
        ports,
        real_ports,
        protocols,
        proxies,
        random,
        output,
        repeat,
        silent,
    } = bindings;

    let mut stream: TaskStream = Box::new(tasks.into_iter());

    if repeat > 1 {
        stream = Box::new(stream.flat_map(move |task| std::iter::repeat_n(task, repeat)));
    }

    stream = Box::new(FanOut::new(stream, targets, Slot::Target));

    for (values, variable) in [
        (ports, PORT_VAR),
        (real_ports, REAL_PORT_VAR),
        (protocols, PROTO_VAR),
    ] {
        if let Some(values) = values {
            stream = Box::new(FanOut::new(stream, values, Slot::Variable(variable)));
        }
    }

    if let Some(proxies) = proxies {
        stream = cycle_proxies(stream, proxies);
    }

    for (value, variable) in [(random, RANDOM_VAR), (output, OUTPUT_VAR)] {
        if let Some(value) = value {
            stream = Box::new(stream.map(move |mut task| {
                task.replace(variable, &value);
                task
            }));
        }
    }

    if silent {
        stream = Box::new(stream.map(|mut task| {
            task.silence();
            task
        }));
    }

    Ok(Expansion { count, stream })
}

/// Derives the `_cleantarget_` form: scheme stripped, trailing slashes dropped,
/// remaining slashes turned into dashes.
///
/// ```rust
/// # use interweave::core::interpolator::clean_target;
/// assert_eq!(clean_target("https://a.b.c/x/y/"), "a.b.c-x-y");
/// ```
pub fn clean_target(target: &str) -> String {
    let bare = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"))
        .unwrap_or(target);
    bare.trim_end_matches('/').replace('/', "-")
}

fn substitute_target(task: &mut Task, target: &str) {
    task.replace(TARGET_VAR, target);
    task.replace(HOST_VAR, target);
    if task.mentions(CLEAN_TARGET_VAR) {
        task.replace(CLEAN_TARGET_VAR, &clean_target(target));
    }
}

// --- Stages ---

/// What a fan-out stage substitutes.
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// `_target_`, `_host_` and `_cleantarget_`, all from the same target.
    Target,
    Variable(&'static str),
}

impl Slot {
    fn matches(self, task: &Task) -> bool {
        match self {
            Self::Target => task.mentions_any(TARGET_FAMILY),
            Self::Variable(variable) => task.mentions(variable),
        }
    }

    fn fill(self, task: &mut Task, value: &str) {
        match self {
            Self::Target => substitute_target(task, value),
            Self::Variable(variable) => task.replace(variable, value),
        }
    }
}

/// Yields one clone of each matching upstream task per value.
struct FanOut<I> {
    upstream: I,
    values: Arc<[String]>,
    slot: Slot,
    pending: Option<(Task, usize)>,
}

impl<I> FanOut<I> {
    fn new(upstream: I, values: Arc<[String]>, slot: Slot) -> Self {
        Self {
            upstream,
            values,
            slot,
            pending: None,
        }
    }
}

impl<I: Iterator<Item = Task>> Iterator for FanOut<I> {
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        let slot = self.slot;
        loop {
            if let Some((template, index)) = self.pending.as_mut() {
                if let Some(value) = self.values.get(*index) {
                    *index += 1;
                    let mut task = template.clone();
                    slot.fill(&mut task, value);
                    return Some(task);
                }
            }
            self.pending = None;

            let task = self.upstream.next()?;
            if !slot.matches(&task) {
                return Some(task);
            }
            self.pending = Some((task, 0));
        }
    }
}

/// Assigns proxies round-robin to the tasks that mention `_proxy_`.
fn cycle_proxies(stream: TaskStream, proxies: Vec<String>) -> TaskStream {
    let mut cursor = proxies.into_iter().cycle();
    Box::new(stream.map(move |mut task| {
        if task.mentions(PROXY_VAR) {
            if let Some(proxy) = cursor.next() {
                task.replace(PROXY_VAR, &proxy);
            }
        }
        task
    }))
}
