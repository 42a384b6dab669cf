//! NewType wrappers for strong typing throughout the orchestrator.
//!
//! These types prevent accidental mixing of semantically different numbers
//! (e.g., passing an exit code where a run identifier is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single scheduled run.
///
/// Ids are assigned monotonically by the owning [`Scheduler`] and are never
/// reused within one scheduler instance. They carry no meaning across
/// instances or process restarts.
///
/// [`Scheduler`]: crate::Scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(u64);

impl RunId {
    /// Create a run id from its raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RunId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_creation() {
        let id = RunId::new(7);
        assert_eq!(id.value(), 7);
        assert_eq!(id.to_string(), "run-7");
    }

    #[test]
    fn test_run_id_from_u64() {
        let id: RunId = 42u64.into();
        assert_eq!(id, RunId::new(42));
    }

    #[test]
    fn test_run_id_ordering() {
        assert!(RunId::new(1) < RunId::new(2));
        assert_eq!(RunId::new(3), RunId::new(3));
    }

    #[test]
    fn test_run_id_serde() {
        let id = RunId::new(13);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "13");

        let parsed: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
