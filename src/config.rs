//! Scheduler configuration: concurrency limit and output flush interval.
//!
//! Configuration is optional; a missing file means defaults. The lookup
//! chain is `SOLVER_SCHEDULER_CONFIG`, then
//! `$XDG_CONFIG_HOME/solver-orchestrator/config.json`, then
//! `./scheduler.json`.

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

/// Concurrency limit applied when no configuration overrides it.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 8;

/// Flush delay applied when no configuration overrides it.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently active runs.
    pub concurrency_limit: usize,
    /// Delay before buffered output becomes visible in a run's output.
    pub flush_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Parse a configuration file. Unknown fields are ignored, missing
    /// fields fall back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid scheduler config in {}", path.display()))?;
        ensure!(
            config.concurrency_limit > 0,
            "concurrencyLimit must be at least 1 in {}",
            path.display()
        );
        Ok(config)
    }

    /// Load configuration from the resolved path, or defaults when no file
    /// exists anywhere in the lookup chain.
    pub fn load() -> Result<Self> {
        match resolve_config_path() {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Resolve the configuration file location, if any.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("SOLVER_SCHEDULER_CONFIG") {
        return Some(PathBuf::from(path));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg)
            .join("solver-orchestrator")
            .join("config.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("scheduler.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.concurrency_limit, 8);
        assert_eq!(config.flush_interval_ms, 100);
        assert_eq!(config.flush_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"concurrencyLimit": 2, "flushIntervalMs": 50}}"#).unwrap();

        let config = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.flush_interval_ms, 50);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"concurrencyLimit": 4}}"#).unwrap();

        let config = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.flush_interval_ms, DEFAULT_FLUSH_INTERVAL_MS);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(SchedulerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"concurrencyLimit": 0}}"#).unwrap();
        assert!(SchedulerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(SchedulerConfig::from_file(Path::new("/nonexistent/config.json")).is_err());
    }
}
