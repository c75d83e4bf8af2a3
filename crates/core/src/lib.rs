pub mod audit;
pub mod config;
pub mod encoder;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod presentation;
pub mod renderer;
pub mod storage;
pub mod testing;
pub mod timing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use job::{ExportJob, JobState, JobStore, SqliteJobStore};
pub use orchestrator::{ExportOrchestrator, OrchestratorConfig};
pub use pipeline::ExportPipeline;
