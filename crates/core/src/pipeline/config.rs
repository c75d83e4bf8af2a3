//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::timing::TimingOptions;

/// Configuration for the export pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding per-job working directories.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Allowed relative divergence between the narration track and the
    /// summed slide durations before the job fails.
    #[serde(default = "default_timing_tolerance")]
    pub timing_tolerance: f64,

    /// Request timeout for fetching one narration chunk (seconds). A hung
    /// fetch must not park a worker.
    #[serde(default = "default_chunk_fetch_timeout")]
    pub chunk_fetch_timeout_secs: u64,

    /// Display duration resolution options.
    #[serde(default)]
    pub timing: TimingOptions,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./data/work")
}

fn default_timing_tolerance() -> f64 {
    0.01
}

fn default_chunk_fetch_timeout() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            timing_tolerance: default_timing_tolerance(),
            chunk_fetch_timeout_secs: default_chunk_fetch_timeout(),
            timing: TimingOptions::default(),
        }
    }
}
