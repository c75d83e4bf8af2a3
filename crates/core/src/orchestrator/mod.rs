//! Export job orchestration.
//!
//! Owns the bounded worker pool that drains the pending queue, the
//! reaper that fails jobs with stale heartbeats, retry scheduling, and
//! the submit/cancel/delete entry points used by the HTTP API.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::ExportOrchestrator;
pub use types::{OrchestratorError, OrchestratorStatus, SubmitRequest};
