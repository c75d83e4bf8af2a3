//! Durable storage for finished exports and signed download links.

pub mod config;
pub mod error;
pub mod fs;
pub mod traits;

pub use config::StorageConfig;
pub use error::StorageError;
pub use fs::FsObjectStore;
pub use traits::{export_key, ObjectStore, StoredObject};
