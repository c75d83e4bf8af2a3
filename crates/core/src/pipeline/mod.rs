//! Export pipeline: manifest fetch, frame capture, media assembly,
//! upload. Orchestration (workers, retries, reaping) lives one level up.

pub mod config;
pub mod error;
pub mod export;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use export::ExportPipeline;
