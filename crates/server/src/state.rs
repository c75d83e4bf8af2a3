use std::sync::Arc;

use slidecast_core::audit::{AuditHandle, AuditStore};
use slidecast_core::job::JobStore;
use slidecast_core::storage::FsObjectStore;
use slidecast_core::{Config, ExportOrchestrator, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    audit: AuditHandle,
    audit_store: Arc<dyn AuditStore>,
    jobs: Arc<dyn JobStore>,
    orchestrator: Arc<ExportOrchestrator>,
    objects: Arc<FsObjectStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
        jobs: Arc<dyn JobStore>,
        orchestrator: Arc<ExportOrchestrator>,
        objects: Arc<FsObjectStore>,
    ) -> Self {
        Self {
            config,
            audit,
            audit_store,
            jobs,
            orchestrator,
            objects,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn jobs(&self) -> &dyn JobStore {
        self.jobs.as_ref()
    }

    pub fn orchestrator(&self) -> &ExportOrchestrator {
        self.orchestrator.as_ref()
    }

    pub fn objects(&self) -> &FsObjectStore {
        self.objects.as_ref()
    }
}
