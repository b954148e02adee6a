//! # Compiler
//!
//! Compiles the flat list of command templates into dependency-wired [`Task`]s.
//!
//! The template language has two markers, each recognized only as a whole trimmed line:
//!
//! - `_block:<name>_` (or the unnamed `_block_`) opens a block, and the same marker closes it.
//!   A block becomes one task whose commands run serially; blocks nested inside a block are
//!   flattened into it.
//! - `_blocker_` makes every later task in the global scope wait for every task compiled
//!   before the marker. Inside a block it is a no-op, since blocks are already serial.

use crate::models::{Command, Task, TaskNode};
use crate::{constants::BLOCKER_MARKER, core::completion::Completion};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

lazy_static! {
    // `_block_` or `_block:<name>_`. `_blocker_` does not match.
    static ref BLOCK_RE: Regex = Regex::new(r"^_block(?::(.*))?_$").expect("block marker regex is valid");
}

/// Represents errors that can occur while compiling command templates.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// A block was opened but the input ended before its closing marker.
    #[error("Block '{0}' is never closed. Add a matching '_block:{0}_' line.")]
    UnterminatedBlock(String),
    /// A closing marker names a block that is open, but not the innermost one.
    #[error("Block '{closing}' cannot be closed while block '{innermost}' is still open.")]
    MismatchedBlock { closing: String, innermost: String },
}

/// The role of one trimmed template line.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    BlockMarker(&'a str),
    Blocker,
    Command(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if line == BLOCKER_MARKER {
        return Line::Blocker;
    }
    match BLOCK_RE.captures(line) {
        Some(caps) => Line::BlockMarker(caps.get(1).map_or("", |name| name.as_str().trim())),
        None => Line::Command(line),
    }
}

// --- PUBLIC COMPILER API ---

/// Compiles template lines into tasks, in source order.
///
/// Global-scope tasks are independent unless a `_blocker_` precedes them, in which case they
/// depend on every task compiled before the most recent blocker.
pub fn compile<I, S>(lines: I) -> Result<Vec<Task>, CompileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let lines: Vec<S> = lines.into_iter().collect();
    let mut cursor = lines.iter().map(|line| line.as_ref());

    let mut tasks: Vec<Task> = Vec::new();
    let mut barrier: Arc<[Arc<Completion>]> = Arc::from([]);

    while let Some(line) = cursor.next() {
        match classify(line) {
            Line::Blank => continue,
            Line::Blocker => {
                barrier = tasks
                    .iter()
                    .map(|task| Arc::clone(task.completion()))
                    .collect();
                log::trace!("Blocker after {} task(s).", barrier.len());
            }
            Line::BlockMarker(name) => {
                let mut open = vec![name.to_string()];
                let commands = collect_block(&mut cursor, &mut open)?;
                if commands.is_empty() {
                    log::warn!("Block '{}' is empty and was skipped.", name);
                    continue;
                }
                let node = TaskNode::Block {
                    name: name.to_string(),
                    commands,
                };
                tasks.push(Task::new(node, Arc::clone(&barrier)));
            }
            Line::Command(text) => {
                tasks.push(Task::new(
                    TaskNode::Leaf(Command::new(text)),
                    Arc::clone(&barrier),
                ));
            }
        }
    }

    log::debug!("Compiled {} task(s) from {} line(s).", tasks.len(), lines.len());
    Ok(tasks)
}

/// Consumes lines up to the marker closing the innermost block of `open`.
fn collect_block<'a>(
    cursor: &mut impl Iterator<Item = &'a str>,
    open: &mut Vec<String>,
) -> Result<Vec<Command>, CompileError> {
    let mut commands = Vec::new();
    let innermost = open.last().cloned().unwrap_or_default();

    while let Some(line) = cursor.next() {
        match classify(line) {
            Line::Blank | Line::Blocker => continue,
            Line::Command(text) => commands.push(Command::new(text)),
            Line::BlockMarker(name) if name == innermost => {
                open.pop();
                return Ok(commands);
            }
            Line::BlockMarker(name) if open.iter().any(|outer| outer == name) => {
                return Err(CompileError::MismatchedBlock {
                    closing: name.to_string(),
                    innermost,
                });
            }
            Line::BlockMarker(name) => {
                open.push(name.to_string());
                commands.extend(collect_block(cursor, open)?);
            }
        }
    }

    Err(CompileError::UnterminatedBlock(innermost))
}
