//! Run scheduling and admission control.
//!
//! The scheduler owns every run for its whole lifetime: a table of runs, a
//! FIFO queue of ids waiting to start, and a count of currently active runs
//! bounded by the concurrency limit. Admission happens after every
//! submission and after every termination, forming a FIFO-with-skip loop:
//! unbounded in total runs, bounded in concurrently active ones.
//!
//! All state lives behind a single async mutex and every mutation passes
//! through it, which serializes transitions and output appends without any
//! further locking. No await point is reached while the lock is held.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::executor::{ExecutionUnit, UnitEvent};
use crate::types::RunId;

use super::run::{LifecycleState, Run};
use super::status::{RunStatus, UNKNOWN_EXIT_CODE, resolve_status, status_answer, status_summary};

/// How a run's execution ended, as observed by the relay.
enum UnitOutcome {
    /// The unit delivered its terminal event.
    Completed { exit_code: i32 },
    /// The event channel broke without a terminal event.
    Fault { message: String },
    /// The run's cancellation handle fired; the unit was force-terminated.
    Cancelled,
}

struct SchedulerState {
    runs: HashMap<RunId, Run>,
    queue: VecDeque<RunId>,
    active: usize,
    next_id: u64,
}

/// Read-only view of one run, for external observers.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub id: RunId,
    pub args: Vec<String>,
    pub lifecycle: LifecycleState,
    pub exit_code: Option<i32>,
    pub status: RunStatus,
    pub summary: String,
    pub answer: String,
    pub output: Vec<String>,
    pub activity: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    fn of(run: &Run) -> Self {
        let status = resolve_status(run.lifecycle(), run.exit_code());
        Self {
            id: run.id(),
            args: run.args().to_vec(),
            lifecycle: run.lifecycle(),
            exit_code: run.exit_code(),
            status,
            summary: status_summary(status, run.output()),
            answer: status_answer(status, run.output()),
            output: run.output().to_vec(),
            activity: run.activity().map(str::to_string),
            submitted_at: run.submitted_at(),
            finished_at: run.finished_at(),
        }
    }
}

/// Bounded-concurrency scheduler for cancellable runs.
///
/// Cloning is cheap and every clone operates on the same state; the per-run
/// relay tasks hold such clones to feed events and completion back in.
#[derive(Clone)]
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    unit: Arc<dyn ExecutionUnit>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, unit: Arc<dyn ExecutionUnit>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                runs: HashMap::new(),
                queue: VecDeque::new(),
                active: 0,
                next_id: 0,
            })),
            unit,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Submit a new run. Returns immediately with the assigned id; the run
    /// may or may not have started by the time this returns.
    pub async fn submit(&self, args: Vec<String>) -> RunId {
        let mut state = self.state.lock().await;
        let id = RunId::new(state.next_id);
        state.next_id += 1;
        state.runs.insert(id, Run::new(id, args));
        state.queue.push_back(id);
        debug!(run = %id, queued = state.queue.len(), "run submitted");
        self.admit_pending(&mut state);
        id
    }

    /// Abort a run. A running run transitions to aborted immediately; the
    /// unit's teardown completes asynchronously afterwards. A queued run is
    /// transitioned in place and skipped when its turn comes. Unknown or
    /// already-terminal runs are a safe no-op.
    pub async fn abort(&self, id: RunId) {
        let mut state = self.state.lock().await;
        let Some(run) = state.runs.get_mut(&id) else {
            return;
        };
        if run.mark_aborted() {
            run.flush();
            info!(run = %id, "run aborted");
        }
    }

    /// Remove a run from the table, aborting it first if needed. Never
    /// blocks on the unit's teardown; an active slot is released when the
    /// cancelled relay winds down on its own.
    pub async fn remove(&self, id: RunId) {
        let mut state = self.state.lock().await;
        // Exclude from future admission before touching the run itself.
        state.queue.retain(|queued| *queued != id);
        let Some(mut run) = state.runs.remove(&id) else {
            return;
        };
        run.mark_aborted();
        run.dispose();
        info!(run = %id, "run removed");
    }

    /// Abort and remove every run, resetting the queue and active count.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        for run in state.runs.values_mut() {
            run.mark_aborted();
            run.dispose();
        }
        let removed = state.runs.len();
        state.runs.clear();
        state.queue.clear();
        state.active = 0;
        info!(removed, "scheduler cleared");
    }

    /// Snapshot of a single run, if it exists.
    pub async fn snapshot(&self, id: RunId) -> Option<RunSnapshot> {
        let state = self.state.lock().await;
        state.runs.get(&id).map(RunSnapshot::of)
    }

    /// Snapshots of all runs, in submission order.
    pub async fn snapshots(&self) -> Vec<RunSnapshot> {
        let state = self.state.lock().await;
        let mut snapshots: Vec<RunSnapshot> = state.runs.values().map(RunSnapshot::of).collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    /// Number of currently active runs.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active
    }

    /// Admission step: promote queued runs while a slot is free. Runs that
    /// were removed or aborted before starting are skipped without consuming
    /// a slot, so re-invocation is always safe.
    fn admit_pending(&self, state: &mut SchedulerState) {
        while state.active < self.config.concurrency_limit {
            let Some(id) = state.queue.pop_front() else {
                break;
            };
            let Some(run) = state.runs.get_mut(&id) else {
                continue;
            };
            if !run.mark_running() {
                continue;
            }
            let args = run.args().to_vec();
            let cancel = run.cancel_token();
            state.active += 1;
            debug!(run = %id, active = state.active, "run admitted");
            self.spawn_run(id, args, cancel);
        }
    }

    fn spawn_run(&self, id: RunId, args: Vec<String>, cancel: CancellationToken) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let unit = Arc::clone(&scheduler.unit);
            let unit_task = tokio::spawn(async move { unit.run(args, events_tx).await });
            let outcome = scheduler.relay(id, events_rx, unit_task, cancel).await;
            scheduler.finish_run(id, outcome).await;
        });
    }

    /// Execution-adapter relay: feed unit events into the run until the
    /// terminal event arrives, the channel faults, or cancellation fires.
    /// Exactly one outcome is produced per run.
    async fn relay(
        &self,
        id: RunId,
        mut events: mpsc::UnboundedReceiver<UnitEvent>,
        mut unit_task: JoinHandle<anyhow::Result<()>>,
        cancel: CancellationToken,
    ) -> UnitOutcome {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Forced termination; the unit never gets to finish.
                    unit_task.abort();
                    return UnitOutcome::Cancelled;
                }
                event = events.recv() => match event {
                    Some(UnitEvent::Print(parts)) => {
                        self.push_output(id, parts.join(" ")).await;
                    }
                    Some(UnitEvent::Status(parts)) => {
                        self.set_activity(id, parts.join(" ")).await;
                    }
                    Some(UnitEvent::Finished { exit_code }) => {
                        // The unit reported completion; tear it down.
                        unit_task.abort();
                        return UnitOutcome::Completed {
                            exit_code: exit_code.unwrap_or(UNKNOWN_EXIT_CODE),
                        };
                    }
                    None => {
                        // Channel closed without a terminal event.
                        let message = match unit_task.await {
                            Ok(Ok(())) => {
                                "execution unit exited without reporting completion".to_string()
                            }
                            Ok(Err(error)) => error.to_string(),
                            Err(join_error) => join_error.to_string(),
                        };
                        return UnitOutcome::Fault { message };
                    }
                }
            }
        }
    }

    /// Terminal path, invoked exactly once per admitted run: finalize the
    /// lifecycle, flush remaining output, release the slot, admit the next.
    async fn finish_run(&self, id: RunId, outcome: UnitOutcome) {
        let mut state = self.state.lock().await;
        if let Some(run) = state.runs.get_mut(&id) {
            match outcome {
                UnitOutcome::Completed { exit_code } => {
                    if run.mark_completed(exit_code) {
                        debug!(run = %id, exit_code, "run completed");
                    } else {
                        // Late terminal signal for an already-aborted run:
                        // logged, never applied.
                        debug!(run = %id, exit_code, state = %run.lifecycle(), "ignoring late completion");
                    }
                }
                UnitOutcome::Fault { message } => {
                    if run.mark_error() {
                        run.emit(format!("Error: {message}"));
                        warn!(run = %id, %message, "execution channel fault");
                    } else {
                        debug!(run = %id, %message, state = %run.lifecycle(), "ignoring late fault");
                    }
                }
                // Lifecycle was already set to aborted when the handle fired.
                UnitOutcome::Cancelled => {}
            }
            // Unconditional flush: no emitted line is lost even when the run
            // finished faster than the throttle interval.
            run.flush();
        }
        // Saturating: a relay outliving clear() must not underflow the
        // reset count.
        state.active = state.active.saturating_sub(1);
        self.admit_pending(&mut state);
    }

    /// Append a line to a run's output channel, scheduling a flush if none
    /// is pending. Lines for removed runs are dropped; lines for terminal
    /// runs are still accepted for logging.
    async fn push_output(&self, id: RunId, line: String) {
        let mut state = self.state.lock().await;
        let Some(run) = state.runs.get_mut(&id) else {
            return;
        };
        if run.emit(line) {
            let scheduler = self.clone();
            let delay = self.config.flush_interval();
            run.set_flush_timer(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                scheduler.flush_run(id).await;
            }));
        }
    }

    async fn flush_run(&self, id: RunId) {
        let mut state = self.state.lock().await;
        if let Some(run) = state.runs.get_mut(&id) {
            run.flush();
        }
    }

    async fn set_activity(&self, id: RunId, label: String) {
        let mut state = self.state.lock().await;
        if let Some(run) = state.runs.get_mut(&id) {
            run.set_activity(label);
        }
    }
}
