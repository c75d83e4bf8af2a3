//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the export orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Enable/disable the orchestrator.
    /// When disabled, submitted jobs stay pending until it is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of concurrent export workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// How often each idle worker polls for claimable jobs (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How often the reaper scans for stale processing jobs (milliseconds).
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_ms: u64,

    /// Hard wall-clock budget for one pipeline run (seconds). A job still
    /// running when it expires is failed with the `timeout` class.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// How often a worker refreshes the heartbeat of the job it owns
    /// (seconds). Keeps long encodes alive between progress updates.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// A processing job whose heartbeat is older than this is considered
    /// abandoned and reaped (seconds). Must exceed `job_timeout_secs` so
    /// the owning worker always times a job out before the reaper does.
    #[serde(default = "default_heartbeat_stale")]
    pub heartbeat_stale_secs: u64,

    /// Maximum attempts per export, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff before a retry job becomes claimable (seconds).
    /// Doubles with each subsequent attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Maximum number of pending jobs before submissions are rejected.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_worker_count() -> usize {
    3
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_reaper_interval() -> u64 {
    15_000
}

fn default_job_timeout() -> u64 {
    600
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_heartbeat_stale() -> u64 {
    900
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    30
}

fn default_max_queue_depth() -> usize {
    100
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval(),
            reaper_interval_ms: default_reaper_interval(),
            job_timeout_secs: default_job_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_stale_secs: default_heartbeat_stale(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff(),
            max_queue_depth: default_max_queue_depth(),
        }
    }
}

impl OrchestratorConfig {
    /// Backoff delay before attempt `attempt` (1-based) becomes claimable.
    pub fn backoff_secs(&self, attempt: u32) -> u64 {
        self.retry_backoff_secs << attempt.saturating_sub(2).min(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(config.enabled);
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_queue_depth, 100);
        assert_eq!(config.job_timeout_secs, 600);
        // A healthy job must never look stale: the worker times it out
        // well before the reaper's threshold.
        assert!(config.heartbeat_stale_secs > config.job_timeout_secs);
        assert!(config.heartbeat_interval_secs < config.heartbeat_stale_secs);
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            worker_count = 5
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.enabled);
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let config = OrchestratorConfig::default();
        // Attempt 2 is the first retry.
        assert_eq!(config.backoff_secs(2), 30);
        assert_eq!(config.backoff_secs(3), 60);
        assert_eq!(config.backoff_secs(4), 120);
    }
}
