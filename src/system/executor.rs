// src/system/executor.rs

use crate::{models::Command, system::shell::Shell};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command as ProcessCommand;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Command '{command}' exited with {status}.")]
    NonZeroExitStatus {
        command: String,
        status: ExitStatus,
        /// What the command printed before failing.
        stdout: String,
    },
    #[error("Command '{command}' timed out after {timeout:?} and was killed.")]
    TimedOut { command: String, timeout: Duration },
    #[error("Command '{0}' was interrupted.")]
    Interrupted(String),
}

impl ExecutionError {
    /// Stdout captured before the failure, if the command got that far.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::NonZeroExitStatus { stdout, .. } => Some(stdout),
            _ => None,
        }
    }
}

/// Runs one command through `shell` and returns its captured stdout.
///
/// The command is killed, together with everything it started, if it outlives `timeout`
/// or if `cancellation_token` fires first. Stdout is discarded for silent commands;
/// stderr is always inherited.
pub async fn execute_command(
    command: &Command,
    shell: &Shell,
    timeout: Duration,
    cancellation_token: &CancellationToken,
) -> Result<String, ExecutionError> {
    let command_line = command.text.as_str();
    if command_line.is_empty() {
        return Ok(String::new()); // An empty command is a success, not an error.
    }

    let mut process = ProcessCommand::new(shell.program());
    process
        .args(shell.args())
        .arg(command_line)
        .stdin(Stdio::null())
        .stdout(if command.silent {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    // The shell leads its own process group, so pipelines and subshells die with it.
    #[cfg(unix)]
    process.process_group(0);

    let child = process
        .spawn()
        .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))?;
    let pid = child.id();
    log::trace!("Spawned '{}' (PID: {:?}).", command_line, pid);

    let output = tokio::select! {
        waited = tokio::time::timeout(timeout, child.wait_with_output()) => match waited {
            Ok(output) => output
                .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))?,
            Err(_) => {
                terminate(pid, command_line);
                return Err(ExecutionError::TimedOut {
                    command: command_line.to_string(),
                    timeout,
                });
            }
        },
        () = cancellation_token.cancelled() => {
            terminate(pid, command_line);
            return Err(ExecutionError::Interrupted(command_line.to_string()));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        return Err(ExecutionError::NonZeroExitStatus {
            command: command_line.to_string(),
            status: output.status,
            stdout,
        });
    }
    Ok(stdout)
}

/// Kills the process group led by `pid`. The shell itself is killed and reaped when its
/// handle is dropped (`kill_on_drop`).
fn terminate(pid: Option<u32>, command_line: &str) {
    log::debug!("Killing process group {:?} running '{}'.", pid, command_line);
    #[cfg(unix)]
    if let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            log::warn!("Failed to kill process group {}: {}", pgid, e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn sh() -> Shell {
        Shell::resolve(Some("/bin/sh")).unwrap()
    }

    async fn run(line: &str, timeout: Duration) -> Result<String, ExecutionError> {
        execute_command(&Command::new(line), &sh(), timeout, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_successful_command() {
        assert!(run("true", Duration::from_secs(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_stdout_is_captured() {
        let stdout = run("echo one; echo two | tr a-z A-Z", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(stdout, "one\nTWO\n");
    }

    #[tokio::test]
    async fn test_silent_command_discards_stdout() {
        let mut command = Command::new("echo hidden");
        command.silent = true;
        let stdout = execute_command(&command, &sh(), Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let err = run("echo partial; exit 3", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NonZeroExitStatus { .. }));
        assert_eq!(err.stdout(), Some("partial\n"));
    }

    #[tokio::test]
    async fn test_leading_dash_does_not_hide_failures() {
        let err = run("-exit 3", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NonZeroExitStatus { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_command() {
        let started = Instant::now();
        let err = run("sleep 5", Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(err.to_string().contains("200ms"), "{err}");
    }

    #[tokio::test]
    async fn test_timeout_kills_everything_the_shell_started() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let line = format!("sh -c 'sleep 1; touch {}' | cat", marker.display());

        let err = run(&line, Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::TimedOut { .. }));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "a process of the timed-out command kept running");
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_the_command() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let line = format!("(sleep 1; touch {}) & wait", marker.display());
        let err = execute_command(&Command::new(&line), &sh(), Duration::from_secs(10), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Interrupted(_)));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let missing = Shell::resolve(Some("/nonexistent/shell -c")).unwrap();
        let err = execute_command(
            &Command::new("true"),
            &missing,
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExecutionError::CommandFailed(..)));
    }
}
