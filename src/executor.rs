//! Execution-unit boundary: the event protocol an opaque unit speaks and
//! the seam the scheduler launches units through.
//!
//! The unit is a black box to the scheduler. It receives the run's argument
//! list, emits any number of print and status events over an async channel,
//! and ends with exactly one terminal event carrying the exit code. Returning
//! an error, or dropping the channel without a terminal event, is a
//! transport-level fault, distinct from a reported non-zero exit code.

use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Sender half of a unit's event channel.
pub type UnitSender = mpsc::UnboundedSender<UnitEvent>;

/// A message emitted by a running execution unit.
#[derive(Debug, Clone)]
pub enum UnitEvent {
    /// Incremental output; parts are joined with a space into one line.
    Print(Vec<String>),
    /// Transient activity label, independent of the run's output.
    Status(Vec<String>),
    /// Terminal event. `None` means the unit finished without reporting a
    /// code; the scheduler records the unknown sentinel instead.
    Finished { exit_code: Option<i32> },
}

/// An opaque, isolated execution unit.
///
/// One invocation per admitted run. Implementations run inside their own
/// spawned task with no shared memory with the scheduler; cancellation
/// arrives as a hard task abort, so any held resources must be safe to drop
/// mid-flight.
#[async_trait]
pub trait ExecutionUnit: Send + Sync {
    async fn run(&self, args: Vec<String>, events: UnitSender) -> Result<()>;
}

/// Execution unit backed by an external process.
///
/// Launches the configured program with the run's arguments, relays stdout
/// and stderr lines as print events, and reports the exit status as the
/// terminal event. A spawn failure is a transport fault. The child is killed
/// when the unit task is dropped, which is how forced cancellation reaches
/// the process.
#[derive(Debug, Clone)]
pub struct CommandUnit {
    program: String,
}

impl CommandUnit {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ExecutionUnit for CommandUnit {
    async fn run(&self, args: Vec<String>, events: UnitSender) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program))?;

        let stdout = child.stdout.take().context("child stdout not captured")?;
        let stderr = child.stderr.take().context("child stderr not captured")?;

        // Both streams feed the same print channel.
        let out_events = events.clone();
        let stdout_relay = async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = out_events.send(UnitEvent::Print(vec![line]));
            }
        };
        let err_events = events.clone();
        let stderr_relay = async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = err_events.send(UnitEvent::Print(vec![line]));
            }
        };
        tokio::join!(stdout_relay, stderr_relay);

        let status = child
            .wait()
            .await
            .context("failed to await unit process")?;
        // A signal-terminated child has no code; the scheduler maps the
        // absence to the unknown sentinel.
        let _ = events.send(UnitEvent::Finished {
            exit_code: status.code(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut events: mpsc::UnboundedReceiver<UnitEvent>) -> (Vec<String>, Option<i32>) {
        let mut lines = Vec::new();
        let mut exit_code = None;
        while let Some(event) = events.recv().await {
            match event {
                UnitEvent::Print(parts) => lines.push(parts.join(" ")),
                UnitEvent::Status(_) => {}
                UnitEvent::Finished { exit_code: code } => {
                    exit_code = Some(code.unwrap_or(crate::core::status::UNKNOWN_EXIT_CODE));
                    break;
                }
            }
        }
        (lines, exit_code)
    }

    #[tokio::test]
    async fn test_command_unit_streams_output_and_exit_code() {
        let unit = CommandUnit::new("sh");
        let (tx, rx) = mpsc::unbounded_channel();

        let result = unit
            .run(
                vec!["-c".into(), "echo one; echo two >&2; exit 3".into()],
                tx,
            )
            .await;
        assert!(result.is_ok());

        let (lines, exit_code) = collect(rx).await;
        assert!(lines.contains(&"one".to_string()));
        assert!(lines.contains(&"two".to_string()));
        assert_eq!(exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_command_unit_zero_exit() {
        let unit = CommandUnit::new("sh");
        let (tx, rx) = mpsc::unbounded_channel();

        unit.run(vec!["-c".into(), "echo 42".into()], tx)
            .await
            .unwrap();

        let (lines, exit_code) = collect(rx).await;
        assert_eq!(lines, ["42"]);
        assert_eq!(exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_command_unit_spawn_failure_is_fault() {
        let unit = CommandUnit::new("/nonexistent/solver-binary");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = unit.run(Vec::new(), tx).await;
        assert!(result.is_err());
        // No terminal event was sent; the channel just closes.
        assert!(rx.recv().await.is_none());
    }
}
