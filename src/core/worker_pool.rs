//! # Worker Pool
//!
//! Runs an [`Expansion`] with bounded parallelism.
//!
//! A single producer drains the lazy task stream on a blocking thread into a bounded channel,
//! so expansion and execution are pipelined and memory stays proportional to the queue depth.
//! Workers share the receiving end and, for each task, wait for its dependency signals, run
//! its commands in order and release the task's ticket on the node's [`Completion`].
//!
//! The producer seals a node's latch as soon as the stream moves past the node. Instances of
//! one node are contiguous and nodes arrive in compile order, so by the time any worker holds
//! a dependent, every instance of its dependencies has already been dequeued.

use crate::constants::QUEUE_DEPTH_PER_WORKER;
use crate::core::completion::{Completion, Ticket};
use crate::core::interpolator::{Expansion, TaskStream};
use crate::models::{Command, RunSummary, Task, TaskFailure};
use crate::system::{
    executor::{self, ExecutionError},
    shell::Shell,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid worker count {0}. At least one worker is required.")]
    InvalidWorkerCount(usize),
    #[error("There are no tasks to run.")]
    EmptyQueue,
    #[error("A pool thread stopped unexpectedly: {0}")]
    Join(#[from] JoinError),
}

/// Receives progress and error signals from a running pool.
///
/// Every method has a no-op default so callers only implement what they display.
/// Methods are called from worker tasks and must not block.
pub trait Reporter: Send + Sync {
    fn run_started(&self, _total: usize) {}
    fn command_started(&self, _command: &Command) {}
    /// Stdout captured from a command, delivered once it has exited. Never called for
    /// silent commands or empty output.
    fn command_output(&self, _command: &Command, _stdout: &str) {}
    /// `error` is `None` when the command succeeded.
    fn command_finished(&self, _command: &Command, _error: Option<&ExecutionError>) {}
    /// A task ran to the end, whatever the outcome of its commands.
    fn task_completed(&self, _task: &Task) {}
    fn run_finished(&self, _summary: &RunSummary) {}
}

/// A reporter that discards every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// A queued task and the ticket that keeps its node's latch open.
struct WorkItem {
    task: Task,
    ticket: Ticket,
}

/// Everything a worker needs, shared by all of them.
struct WorkerContext {
    shell: Shell,
    timeout: Duration,
    reporter: Arc<dyn Reporter>,
    shutdown: CancellationToken,
}

pub struct WorkerPool {
    max_workers: usize,
    timeout: Duration,
    shell: Shell,
    reporter: Arc<dyn Reporter>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool running at most `max_workers` tasks at once, each command bounded
    /// by `timeout`.
    pub fn new(max_workers: usize, timeout: Duration, shell: Shell) -> Result<Self, PoolError> {
        if max_workers == 0 {
            return Err(PoolError::InvalidWorkerCount(max_workers));
        }
        Ok(Self {
            max_workers,
            timeout,
            shell,
            reporter: Arc::new(SilentReporter),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Uses `token` to stop the run: cancelling it stops the producer, releases workers
    /// waiting on dependencies and kills running commands.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs every task of `expansion` and returns once the queue is drained and all
    /// in-flight tasks have finished.
    ///
    /// Task failures are collected in the summary and never abort the run.
    pub async fn run(self, expansion: Expansion) -> Result<RunSummary, PoolError> {
        let Expansion { count, stream } = expansion;
        if count == 0 {
            return Err(PoolError::EmptyQueue);
        }

        let concurrency = self.max_workers.min(count);
        log::debug!(
            "Running {} task(s) on {} worker(s), timeout {}s.",
            count,
            concurrency,
            self.timeout.as_secs()
        );
        self.reporter.run_started(count);

        let (sender, receiver) = mpsc::channel(concurrency * QUEUE_DEPTH_PER_WORKER);
        let producer = tokio::task::spawn_blocking({
            let shutdown = self.shutdown.clone();
            move || produce(stream, sender, shutdown)
        });

        let context = Arc::new(WorkerContext {
            shell: self.shell,
            timeout: self.timeout,
            reporter: Arc::clone(&self.reporter),
            shutdown: self.shutdown.clone(),
        });
        let queue = Arc::new(Mutex::new(receiver));
        let mut workers = JoinSet::new();
        for id in 0..concurrency {
            workers.spawn(work(id, Arc::clone(&queue), Arc::clone(&context)));
        }

        let mut summary = RunSummary {
            total: count,
            ..RunSummary::default()
        };
        while let Some(joined) = workers.join_next().await {
            summary.absorb(joined?);
        }

        let produced = producer.await?;
        summary.cancelled |= self.shutdown.is_cancelled();
        if produced != count && !summary.cancelled {
            log::warn!("Expected {} task(s) but the expansion produced {}.", count, produced);
        }

        self.reporter.run_finished(&summary);
        Ok(summary)
    }
}

// --- Producer ---

/// Drains `stream` into the queue, sealing each node once the stream has moved past it.
/// Returns the number of tasks enqueued.
fn produce(stream: TaskStream, sender: mpsc::Sender<WorkItem>, shutdown: CancellationToken) -> usize {
    let mut current: Option<Arc<Completion>> = None;
    let mut produced = 0;

    for task in stream {
        if shutdown.is_cancelled() {
            log::debug!("Producer stopped after {} task(s).", produced);
            break;
        }

        let completion = Arc::clone(task.completion());
        let moved_on = current
            .as_ref()
            .is_none_or(|previous| !Arc::ptr_eq(previous, &completion));
        if moved_on {
            if let Some(previous) = current.replace(completion) {
                previous.seal();
            }
        }

        let ticket = task.completion().admit();
        if sender.blocking_send(WorkItem { task, ticket }).is_err() {
            log::warn!("Every worker has stopped; dropping the remaining tasks.");
            break;
        }
        produced += 1;
    }

    if let Some(last) = current {
        last.seal();
    }
    produced
}

// --- Workers ---

async fn work(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    context: Arc<WorkerContext>,
) -> RunSummary {
    let mut summary = RunSummary::default();

    loop {
        let next = queue.lock().await.recv().await;
        let Some(WorkItem { task, ticket }) = next else {
            break;
        };

        if context.shutdown.is_cancelled() {
            summary.skipped += 1;
            continue;
        }

        let ready = tokio::select! {
            () = task.wait_for_dependencies() => true,
            () = context.shutdown.cancelled() => false,
        };
        if !ready {
            summary.skipped += 1;
            continue;
        }

        let finished = run_task(&task, &context, &mut summary).await;
        drop(ticket);
        if finished {
            summary.completed += 1;
            context.reporter.task_completed(&task);
        }
    }

    log::trace!("Worker {} finished: {} task(s) completed.", id, summary.completed);
    summary
}

/// Runs the commands of `task` in order. Returns `false` if the run was cancelled midway.
async fn run_task(task: &Task, context: &WorkerContext, summary: &mut RunSummary) -> bool {
    for command in task.node().commands() {
        context.reporter.command_started(command);
        let outcome =
            executor::execute_command(command, &context.shell, context.timeout, &context.shutdown)
                .await;

        let stdout = match &outcome {
            Ok(stdout) => Some(stdout.as_str()),
            Err(error) => error.stdout(),
        };
        if let Some(stdout) = stdout.filter(|stdout| !stdout.is_empty()) {
            context.reporter.command_output(command, stdout);
        }
        context.reporter.command_finished(command, outcome.as_ref().err());

        match outcome {
            Ok(_) => {}
            Err(ExecutionError::Interrupted(_)) => {
                summary.cancelled = true;
                return false;
            }
            Err(error) => summary.failures.push(TaskFailure {
                command: command.text.clone(),
                error,
            }),
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        compiler::compile,
        interpolator::{Bindings, expand},
    };
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Started(String),
        Output(String, String),
        Finished(String),
    }

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<Event>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn position(&self, event: Event) -> usize {
            self.events()
                .iter()
                .position(|recorded| *recorded == event)
                .unwrap_or_else(|| panic!("{event:?} was never recorded"))
        }
    }

    impl Reporter for Recorder {
        fn command_started(&self, command: &Command) {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            self.events
                .lock()
                .unwrap()
                .push(Event::Started(command.text.clone()));
        }

        fn command_output(&self, command: &Command, stdout: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Output(command.text.clone(), stdout.to_string()));
        }

        fn command_finished(&self, command: &Command, _error: Option<&ExecutionError>) {
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.events
                .lock()
                .unwrap()
                .push(Event::Finished(command.text.clone()));
        }
    }

    fn expansion(lines: &[&str], targets: &[&str]) -> Expansion {
        let tasks = compile(lines.iter().copied()).unwrap();
        expand(tasks, Bindings::new(targets.iter().map(|t| t.to_string()))).unwrap()
    }

    fn pool(workers: usize, timeout: Duration) -> WorkerPool {
        WorkerPool::new(workers, timeout, Shell::resolve(Some("/bin/sh")).unwrap()).unwrap()
    }

    fn started(text: &str) -> Event {
        Event::Started(text.to_string())
    }

    fn finished(text: &str) -> Event {
        Event::Finished(text.to_string())
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let shell = Shell::resolve(Some("/bin/sh")).unwrap();
        assert!(matches!(
            WorkerPool::new(0, Duration::from_secs(1), shell),
            Err(PoolError::InvalidWorkerCount(0))
        ));
    }

    #[tokio::test]
    async fn test_empty_queue_is_rejected() {
        let empty = expansion(&[], &["a"]);
        assert!(matches!(
            pool(2, Duration::from_secs(1)).run(empty).await,
            Err(PoolError::EmptyQueue)
        ));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocker_orders_later_tasks() {
        let recorder = Arc::new(Recorder::default());
        let run = expansion(&["sleep 0.3; : a", "sleep 0.1; : b", "_blocker_", ": c"], &["x"]);
        let summary = pool(3, Duration::from_secs(5))
            .with_reporter(recorder.clone())
            .run(run)
            .await
            .unwrap();

        assert_eq!(summary.completed, 3);
        assert!(summary.is_success());
        let c = recorder.position(started(": c"));
        assert!(recorder.position(finished("sleep 0.3; : a")) < c);
        assert!(recorder.position(finished("sleep 0.1; : b")) < c);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dependents_wait_for_every_instance() {
        let recorder = Arc::new(Recorder::default());
        let run = expansion(&["sleep 0.1; : _target_", "_blocker_", ": after"], &["a", "b", "c"]);
        assert_eq!(run.count, 4);

        let summary = pool(2, Duration::from_secs(5))
            .with_reporter(recorder.clone())
            .run(run)
            .await
            .unwrap();

        assert_eq!(summary.completed, 4);
        let after = recorder.position(started(": after"));
        for target in ["a", "b", "c"] {
            assert!(recorder.position(finished(&format!("sleep 0.1; : {target}"))) < after);
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_commands_run_serially() {
        let recorder = Arc::new(Recorder::default());
        let run = expansion(
            &["_block:x_", "sleep 0.2; : one", ": two", "_block:x_", ": free"],
            &["h"],
        );
        assert_eq!(run.count, 2);

        let summary = pool(2, Duration::from_secs(5))
            .with_reporter(recorder.clone())
            .run(run)
            .await
            .unwrap();

        assert_eq!(summary.completed, 2);
        assert!(recorder.position(finished("sleep 0.2; : one")) < recorder.position(started(": two")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failures_are_recorded_without_stopping_the_pool() {
        let run = expansion(&["exit 3", "-exit 4", "true", "_blocker_", "true"], &["h"]);
        let summary = pool(2, Duration::from_secs(5)).run(run).await.unwrap();

        assert_eq!(summary.completed, 4);
        let mut failed: Vec<&str> = summary
            .failures
            .iter()
            .map(|failure| failure.command.as_str())
            .collect();
        failed.sort_unstable();
        assert_eq!(failed, ["-exit 4", "exit 3"]);
        assert!(!summary.is_success());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_the_worker_count() {
        let recorder = Arc::new(Recorder::default());
        let run = expansion(&["sleep 0.2; : _target_"], &["1", "2", "3", "4", "5", "6", "7", "8"]);
        assert_eq!(run.count, 8);

        let summary = pool(2, Duration::from_secs(10))
            .with_reporter(recorder.clone())
            .run(run)
            .await
            .unwrap();

        assert_eq!(summary.completed, 8);
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 2);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fewer_tasks_than_workers_all_run_at_once() {
        let recorder = Arc::new(Recorder::default());
        let run = expansion(&["sleep 0.3; : _target_"], &["1", "2", "3"]);

        pool(8, Duration::from_secs(10))
            .with_reporter(recorder.clone())
            .run(run)
            .await
            .unwrap();

        assert_eq!(recorder.peak.load(Ordering::SeqCst), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_delivered_to_the_reporter() {
        let recorder = Arc::new(Recorder::default());
        let run = expansion(&["echo hello _target_", "echo failing; exit 2", "true"], &["h"]);

        pool(2, Duration::from_secs(5))
            .with_reporter(recorder.clone())
            .run(run)
            .await
            .unwrap();

        let outputs: Vec<Event> = recorder
            .events()
            .into_iter()
            .filter(|event| matches!(event, Event::Output(..)))
            .collect();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.contains(&Event::Output("echo hello h".to_string(), "hello h\n".to_string())));
        assert!(outputs.contains(&Event::Output(
            "echo failing; exit 2".to_string(),
            "failing\n".to_string()
        )));
        assert!(
            recorder.position(Event::Output("echo hello h".to_string(), "hello h\n".to_string()))
                < recorder.position(finished("echo hello h"))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_tasks_produce_no_output() {
        let recorder = Arc::new(Recorder::default());
        let tasks = compile(["echo quiet _target_"]).unwrap();
        let run = expand(tasks, Bindings::new(["h".to_string()]).with_silent(true)).unwrap();

        pool(1, Duration::from_secs(5))
            .with_reporter(recorder.clone())
            .run(run)
            .await
            .unwrap();

        assert!(!recorder.events().iter().any(|event| matches!(event, Event::Output(..))));
        assert_eq!(recorder.position(finished("echo quiet h")), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_task_is_a_failure() {
        let run = expansion(&["sleep 5", "_blocker_", "true"], &["h"]);
        let summary = pool(1, Duration::from_millis(200)).run(run).await.unwrap();

        assert_eq!(summary.completed, 2);
        assert!(matches!(
            summary.failures.as_slice(),
            [TaskFailure { error: ExecutionError::TimedOut { .. }, .. }]
        ));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_skips_waiting_tasks() {
        let recorder = Arc::new(Recorder::default());
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            trigger.cancel();
        });

        let run = expansion(&["sleep 5", "_blocker_", ": never"], &["h"]);
        let summary = pool(2, Duration::from_secs(10))
            .with_reporter(recorder.clone())
            .with_cancellation(token)
            .run(run)
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.completed, 0);
        assert!(!recorder.events().contains(&started(": never")));
    }
}
