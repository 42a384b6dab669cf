//! A single schedulable run: lifecycle state machine, accumulated output,
//! and the throttled output channel that coalesces high-frequency print
//! events into batched appends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::types::RunId;

/// Coarse, scheduler-observed state of a run.
///
/// This tracks what the scheduler caused or observed, independent of the
/// exit code the execution unit itself reported. Transitions form a DAG:
/// `queued -> running -> {completed, aborted, error}`, with the extra edge
/// `queued -> aborted` for runs cancelled before they ever start. Terminal
/// states are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Queued,
    Running,
    Completed,
    Aborted,
    Error,
}

impl LifecycleState {
    /// Whether no further lifecycle transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Error)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Per-run buffering of incremental output.
///
/// Print events land in `pending` first; a flush (scheduled by the scheduler
/// after a fixed delay, or forced on termination) moves them into the run's
/// durable output in emission order. The timer/buffer pair is owned
/// exclusively by its run and never aliased elsewhere.
#[derive(Debug, Default)]
struct OutputChannel {
    pending: Vec<String>,
    flush_timer: Option<JoinHandle<()>>,
}

impl OutputChannel {
    /// Buffer a line. Returns true when no flush is currently scheduled,
    /// i.e. the caller should schedule one.
    fn push(&mut self, line: String) -> bool {
        self.pending.push(line);
        self.flush_timer.is_none()
    }

    /// Take all pending lines, cancelling any scheduled flush.
    fn drain(&mut self) -> Vec<String> {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        std::mem::take(&mut self.pending)
    }

    /// Drop buffered lines and cancel any scheduled flush.
    fn dispose(&mut self) {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        self.pending.clear();
    }
}

/// One scheduled, cancellable job tracked by the scheduler.
///
/// A run is created in `queued` state at submission time and remains in the
/// scheduler's table, still inspectable, after termination until explicitly
/// removed.
#[derive(Debug)]
pub struct Run {
    id: RunId,
    args: Vec<String>,
    lifecycle: LifecycleState,
    exit_code: Option<i32>,
    output: Vec<String>,
    activity: Option<String>,
    cancel: CancellationToken,
    channel: OutputChannel,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub(crate) fn new(id: RunId, args: Vec<String>) -> Self {
        Self {
            id,
            args,
            lifecycle: LifecycleState::Queued,
            exit_code: None,
            output: Vec::new(),
            activity: None,
            cancel: CancellationToken::new(),
            channel: OutputChannel::default(),
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Exit code reported by the execution unit, present only once the run
    /// completed.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Durable output lines, in emission order. Lines still sitting in the
    /// pending buffer are not visible here until the next flush.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Transient activity label last reported by the execution unit.
    pub fn activity(&self) -> Option<&str> {
        self.activity.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// The run's one-shot cancellation handle, observed by the execution
    /// adapter. Cloning is cheap; the clone observes the same signal.
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `queued -> running`. Silent no-op (returns false) unless the run is
    /// exactly queued.
    pub(crate) fn mark_running(&mut self) -> bool {
        if self.lifecycle != LifecycleState::Queued {
            return false;
        }
        self.lifecycle = LifecycleState::Running;
        true
    }

    /// `running -> completed`, recording the reported exit code. Ignored
    /// once the run is no longer running (e.g. aborted concurrently).
    pub(crate) fn mark_completed(&mut self, exit_code: i32) -> bool {
        if self.lifecycle != LifecycleState::Running {
            return false;
        }
        self.lifecycle = LifecycleState::Completed;
        self.exit_code = Some(exit_code);
        self.finished_at = Some(Utc::now());
        true
    }

    /// `running -> error` on a transport-level fault. Ignored once the run
    /// is no longer running.
    pub(crate) fn mark_error(&mut self) -> bool {
        if self.lifecycle != LifecycleState::Running {
            return false;
        }
        self.lifecycle = LifecycleState::Error;
        self.finished_at = Some(Utc::now());
        true
    }

    /// `{queued, running} -> aborted`, triggering the cancellation handle.
    /// Takes precedence over any completion or fault signal that arrives
    /// afterwards. No-op on terminal runs.
    pub(crate) fn mark_aborted(&mut self) -> bool {
        if self.lifecycle.is_terminal() {
            return false;
        }
        self.lifecycle = LifecycleState::Aborted;
        self.finished_at = Some(Utc::now());
        self.cancel.cancel();
        true
    }

    /// Buffer an output line. Returns true when the caller should schedule
    /// a flush (none is pending yet). Late lines arriving after a terminal
    /// transition are still accepted for logging.
    pub(crate) fn emit(&mut self, line: String) -> bool {
        self.channel.push(line)
    }

    /// Replace the transient activity label.
    pub(crate) fn set_activity(&mut self, label: String) {
        self.activity = Some(label);
    }

    pub(crate) fn set_flush_timer(&mut self, timer: JoinHandle<()>) {
        self.channel.flush_timer = Some(timer);
    }

    /// Move all pending lines into the durable output, in emission order,
    /// cancelling any scheduled flush.
    pub(crate) fn flush(&mut self) {
        self.output.extend(self.channel.drain());
    }

    /// Release buffering resources: cancel the flush timer, drop pending
    /// lines. Called when the run is removed from the table.
    pub(crate) fn dispose(&mut self) {
        self.channel.dispose();
    }
}
