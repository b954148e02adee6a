// src/models.rs

use crate::{core::completion::Completion, system::executor::ExecutionError};
use std::sync::Arc;

// --- EXECUTION MODELS ---

/// A single shell command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub text: String,
    /// Discard the command's stdout instead of capturing and printing it.
    pub silent: bool,
}

impl Command {
    pub fn new(line: &str) -> Self {
        Self {
            text: line.trim().to_string(),
            silent: false,
        }
    }
}

/// The unit a worker executes: a single command, or a block of commands run in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskNode {
    Leaf(Command),
    Block { name: String, commands: Vec<Command> },
}

impl TaskNode {
    /// The commands this node runs, in execution order.
    pub fn commands(&self) -> &[Command] {
        match self {
            Self::Leaf(command) => std::slice::from_ref(command),
            Self::Block { commands, .. } => commands,
        }
    }

    fn commands_mut(&mut self) -> &mut [Command] {
        match self {
            Self::Leaf(command) => std::slice::from_mut(command),
            Self::Block { commands, .. } => commands,
        }
    }
}

/// A task node together with its place in the dependency graph.
///
/// Cloning deep-copies the command text but shares the dependency and completion
/// signals, so every expanded instance reports to the node it was compiled from.
#[derive(Debug, Clone)]
pub struct Task {
    node: TaskNode,
    dependencies: Arc<[Arc<Completion>]>,
    completion: Arc<Completion>,
}

impl Task {
    /// Creates a task that waits on `dependencies` before running.
    pub fn new(node: TaskNode, dependencies: Arc<[Arc<Completion>]>) -> Self {
        Self {
            node,
            dependencies,
            completion: Completion::new(),
        }
    }

    /// Creates a single-command task with no dependencies.
    pub fn leaf(line: &str) -> Self {
        Self::new(TaskNode::Leaf(Command::new(line)), Arc::from([]))
    }

    pub fn node(&self) -> &TaskNode {
        &self.node
    }

    /// A human-readable name: the command line, or the block name for blocks.
    pub fn name(&self) -> String {
        match &self.node {
            TaskNode::Leaf(command) => command.text.clone(),
            TaskNode::Block { name, commands } => {
                format!("block '{}' ({} commands)", name, commands.len())
            }
        }
    }

    pub fn dependencies(&self) -> &[Arc<Completion>] {
        &self.dependencies
    }

    /// The completion signal shared by every instance of this task's node.
    pub fn completion(&self) -> &Arc<Completion> {
        &self.completion
    }

    /// Returns `true` if any command of this task contains `variable`.
    pub fn mentions(&self, variable: &str) -> bool {
        self.node
            .commands()
            .iter()
            .any(|command| command.text.contains(variable))
    }

    pub fn mentions_any(&self, variables: &[&str]) -> bool {
        variables.iter().any(|variable| self.mentions(variable))
    }

    /// Substitutes `variable` with `value` in every command of this task.
    pub fn replace(&mut self, variable: &str, value: &str) {
        for command in self.node.commands_mut() {
            if command.text.contains(variable) {
                command.text = command.text.replace(variable, value);
            }
        }
    }

    /// Discards the stdout of every command of this task.
    pub fn silence(&mut self) {
        for command in self.node.commands_mut() {
            command.silent = true;
        }
    }

    /// Waits until every dependency node has completed.
    pub async fn wait_for_dependencies(&self) {
        for dependency in self.dependencies.iter() {
            dependency.wait().await;
        }
    }
}

// --- RUN RESULTS ---

/// A command that failed during a run.
#[derive(Debug)]
pub struct TaskFailure {
    pub command: String,
    pub error: ExecutionError,
}

/// Aggregated outcome of a worker pool run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Number of tasks the expansion announced.
    pub total: usize,
    /// Tasks that ran to the end, whether or not their commands succeeded.
    pub completed: usize,
    /// Tasks dequeued after cancellation and never started.
    pub skipped: usize,
    pub failures: Vec<TaskFailure>,
    pub cancelled: bool,
}

impl RunSummary {
    pub(crate) fn absorb(&mut self, other: Self) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures.is_empty()
    }
}
