//! Renderer configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the headless capture surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Path to the headless browser binary.
    #[serde(default = "default_browser_path")]
    pub browser_path: PathBuf,

    /// Settle delay after navigating to a slide, in milliseconds.
    /// Gives CSS layout and entry animations time to complete before
    /// the still is taken.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Hard timeout for a single slide capture, in seconds.
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: u64,

    /// Extra arguments appended to every browser invocation.
    #[serde(default)]
    pub extra_browser_args: Vec<String>,
}

fn default_browser_path() -> PathBuf {
    PathBuf::from("chromium")
}

fn default_settle_ms() -> u64 {
    500
}

fn default_capture_timeout() -> u64 {
    30
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            browser_path: default_browser_path(),
            settle_ms: default_settle_ms(),
            capture_timeout_secs: default_capture_timeout(),
            extra_browser_args: Vec::new(),
        }
    }
}
