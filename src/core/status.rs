//! Pure derivation of the consumer-facing status of a run.
//!
//! "The scheduler believes the job finished" and "the job itself reports
//! success" are orthogonal signals: a process can exit with a failure code
//! while the scheduler only observes a clean channel close. The resolver
//! reconciles the two: the lifecycle state wins whenever it is not
//! `completed`, and the exit code refines a completed run into its final
//! classification.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::run::LifecycleState;

/// Exit code recorded when the execution unit finishes without reporting
/// one. Shares its value with the code the resolver maps to
/// [`RunStatus::Aborted`]; lifecycle precedence is the only disambiguation.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Exit code a unit reports for ordinary success.
pub const EXIT_COMPLETED: i32 = 0;

/// Exit code a unit reports when it decided the requested work did not
/// apply and was skipped.
pub const EXIT_SKIPPED: i32 = 2;

/// Externally visible classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Skipped,
    Aborted,
    Error,
    Unknown,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Derive the visible status from a run's lifecycle state and exit code.
///
/// Any lifecycle other than `completed` maps through verbatim. A completed
/// run is classified by its exit code: 0 completed, 2 skipped, -1 aborted,
/// anything else an error. A completed run whose unit never reported a code
/// carries [`UNKNOWN_EXIT_CODE`].
pub fn resolve_status(lifecycle: LifecycleState, exit_code: Option<i32>) -> RunStatus {
    match lifecycle {
        LifecycleState::Queued => RunStatus::Queued,
        LifecycleState::Running => RunStatus::Running,
        LifecycleState::Aborted => RunStatus::Aborted,
        LifecycleState::Error => RunStatus::Error,
        LifecycleState::Completed => match exit_code.unwrap_or(UNKNOWN_EXIT_CODE) {
            EXIT_COMPLETED => RunStatus::Completed,
            EXIT_SKIPPED => RunStatus::Skipped,
            UNKNOWN_EXIT_CODE => RunStatus::Aborted,
            _ => RunStatus::Error,
        },
    }
}

/// One-line textual summary of a run.
///
/// A completed run with exactly one output line summarizes as that line,
/// treated as "the answer". Everything else summarizes as the status
/// name.
pub fn status_summary(status: RunStatus, output: &[String]) -> String {
    if status == RunStatus::Completed && output.len() == 1 {
        output[0].clone()
    } else {
        status.to_string()
    }
}

/// Compact "answer" cell for a run.
///
/// The sole output line when a completed run produced exactly one; a
/// multi-line marker when it produced several; otherwise one fixed
/// placeholder per status. Consumers rely on the mapping being stable and
/// 1:1, so every status keeps a distinct symbol.
pub fn status_answer(status: RunStatus, output: &[String]) -> String {
    match status {
        RunStatus::Completed if output.len() == 1 => output[0].clone(),
        RunStatus::Completed => "▤".to_string(),
        RunStatus::Queued => "⌛".to_string(),
        RunStatus::Running => "…".to_string(),
        RunStatus::Skipped => "↷".to_string(),
        RunStatus::Aborted => "✗".to_string(),
        RunStatus::Error => "⚠".to_string(),
        RunStatus::Unknown => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_completed_lifecycle_maps_verbatim() {
        assert_eq!(resolve_status(LifecycleState::Queued, None), RunStatus::Queued);
        assert_eq!(resolve_status(LifecycleState::Running, None), RunStatus::Running);
        assert_eq!(resolve_status(LifecycleState::Aborted, None), RunStatus::Aborted);
        assert_eq!(resolve_status(LifecycleState::Error, None), RunStatus::Error);
    }

    #[test]
    fn test_completed_classified_by_exit_code() {
        assert_eq!(resolve_status(LifecycleState::Completed, Some(0)), RunStatus::Completed);
        assert_eq!(resolve_status(LifecycleState::Completed, Some(2)), RunStatus::Skipped);
        assert_eq!(resolve_status(LifecycleState::Completed, Some(-1)), RunStatus::Aborted);
        assert_eq!(resolve_status(LifecycleState::Completed, Some(7)), RunStatus::Error);
        assert_eq!(resolve_status(LifecycleState::Completed, Some(1)), RunStatus::Error);
    }

    #[test]
    fn test_missing_exit_code_uses_unknown_sentinel() {
        // A unit that finished without reporting a code falls back to -1,
        // which classifies like an abort.
        assert_eq!(resolve_status(LifecycleState::Completed, None), RunStatus::Aborted);
    }

    #[test]
    fn test_lifecycle_wins_over_exit_code() {
        // An aborted run never reports exit-code-driven status, even if a
        // code was somehow recorded.
        assert_eq!(resolve_status(LifecycleState::Aborted, Some(0)), RunStatus::Aborted);
        assert_eq!(resolve_status(LifecycleState::Running, Some(7)), RunStatus::Running);
    }

    #[test]
    fn test_summary_single_completed_line_is_the_answer() {
        let output = vec!["42".to_string()];
        assert_eq!(status_summary(RunStatus::Completed, &output), "42");
    }

    #[test]
    fn test_summary_falls_back_to_status_name() {
        let multi = vec!["a".to_string(), "b".to_string()];
        assert_eq!(status_summary(RunStatus::Completed, &multi), "completed");
        assert_eq!(status_summary(RunStatus::Running, &[]), "running");
        let one = vec!["partial".to_string()];
        // A single line only counts as the answer for completed runs.
        assert_eq!(status_summary(RunStatus::Error, &one), "error");
    }

    #[test]
    fn test_answer_mapping_is_one_to_one() {
        let statuses = [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Skipped,
            RunStatus::Aborted,
            RunStatus::Error,
            RunStatus::Unknown,
        ];
        let answers: Vec<String> = statuses
            .iter()
            .map(|s| status_answer(*s, &["x".to_string(), "y".to_string()]))
            .collect();
        for (i, a) in answers.iter().enumerate() {
            for (j, b) in answers.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "{:?} and {:?} share a placeholder", statuses[i], statuses[j]);
                }
            }
        }
    }

    #[test]
    fn test_answer_collapses_to_sole_output_line() {
        let one = vec!["3.14159".to_string()];
        assert_eq!(status_answer(RunStatus::Completed, &one), "3.14159");
        let multi = vec!["a".to_string(), "b".to_string()];
        assert_eq!(status_answer(RunStatus::Completed, &multi), "▤");
        assert_eq!(status_answer(RunStatus::Aborted, &one), "✗");
    }
}
