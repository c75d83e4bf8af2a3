//! Export job records, lifecycle state machine and storage.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{CreateJobRequest, JobError, JobFilter, JobStore};
pub use types::{
    ErrorClass, ExportJob, ExportPhase, ExportResult, ExportSettings, FrameRate, JobState,
    QualityPreset, Resolution,
};
