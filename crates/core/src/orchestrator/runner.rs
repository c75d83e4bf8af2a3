//! Export orchestrator implementation.
//!
//! Drives export jobs through the state machine:
//! - Workers: bounded pool, each claims one pending job and runs the
//!   pipeline to completion before claiming the next.
//! - Reaper: fails processing jobs whose heartbeat went stale (crashed
//!   worker or lost process) and schedules retries where warranted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::job::{
    CreateJobRequest, ErrorClass, ExportJob, JobFilter, JobState, JobStore,
};
use crate::metrics;
use crate::pipeline::{ExportPipeline, PipelineError};
use crate::presentation::BillingClient;
use crate::storage::ObjectStore;

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, OrchestratorStatus, SubmitRequest};

/// The export orchestrator - owns the worker pool and the job lifecycle.
pub struct ExportOrchestrator {
    config: OrchestratorConfig,
    jobs: Arc<dyn JobStore>,
    billing: Arc<dyn BillingClient>,
    objects: Arc<dyn ObjectStore>,
    pipeline: Arc<ExportPipeline>,
    audit: Option<AuditHandle>,

    // Runtime state
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ExportOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        jobs: Arc<dyn JobStore>,
        billing: Arc<dyn BillingClient>,
        objects: Arc<dyn ObjectStore>,
        pipeline: Arc<ExportPipeline>,
        audit: Option<AuditHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            jobs,
            billing,
            objects,
            pipeline,
            audit,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Start the orchestrator (spawns background tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!(workers = self.config.worker_count, "Starting export orchestrator");

        for worker in 0..self.config.worker_count {
            self.spawn_worker(worker);
        }
        self.spawn_reaper();

        info!("Export orchestrator started");
    }

    /// Stop the orchestrator gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping export orchestrator");

        // Signal shutdown to all workers
        let _ = self.shutdown_tx.send(());

        // Give workers a moment to finish current work
        tokio::time::sleep(Duration::from_millis(500)).await;

        info!("Export orchestrator stopped");
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let count = |state: &str| {
            self.jobs
                .count(&JobFilter::new().with_state(state))
                .unwrap_or(0) as usize
        };

        OrchestratorStatus {
            running: self.running.load(Ordering::Relaxed),
            worker_count: self.config.worker_count,
            in_flight: self.in_flight.load(Ordering::Relaxed),
            pending_count: count("pending"),
            processing_count: count("processing"),
            completed_count: count("completed"),
            failed_count: count("failed"),
        }
    }

    /// Submit a new export job.
    ///
    /// The ledger is debited exactly once, here. Retry attempts created
    /// later reuse this payment.
    pub async fn submit(&self, request: SubmitRequest) -> Result<ExportJob, OrchestratorError> {
        let pending = self
            .jobs
            .count(&JobFilter::new().with_state("pending"))? as usize;
        if pending >= self.config.max_queue_depth {
            return Err(OrchestratorError::QueueFull { depth: pending });
        }

        let job = self.jobs.create(CreateJobRequest::new(
            request.presentation_id.clone(),
            request.requested_by.clone(),
            request.language.clone(),
            request.settings,
        ))?;

        // Debit after the record exists so the ledger reference points at
        // a real job. A failed debit removes the record again.
        if let Err(e) = self
            .billing
            .debit_export(&request.requested_by, &request.presentation_id, &job.id)
            .await
        {
            let _ = self.jobs.delete(&job.id);
            return Err(e.into());
        }

        if let Some(audit) = &self.audit {
            audit
                .emit(AuditEvent::JobSubmitted {
                    job_id: job.id.clone(),
                    presentation_id: job.presentation_id.clone(),
                    requested_by: job.requested_by.clone(),
                    language: job.language.clone(),
                    attempt: job.attempt,
                    retry_of: job.retry_of.clone(),
                })
                .await;
        }
        metrics::JOBS_SUBMITTED.inc();

        info!(job_id = %job.id, presentation_id = %job.presentation_id, "export submitted");
        Ok(job)
    }

    /// Request cancellation of a job.
    ///
    /// Pending jobs cancel immediately; processing jobs get the flag set
    /// and tear down at the pipeline's next checkpoint.
    pub async fn cancel(
        &self,
        job_id: &str,
        cancelled_by: &str,
    ) -> Result<ExportJob, OrchestratorError> {
        let previous = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if previous.state.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                operation: "cancel".to_string(),
                actual: previous.state.state_type().to_string(),
            });
        }

        let job = self.jobs.request_cancel(job_id)?;

        if let Some(audit) = &self.audit {
            audit
                .emit(AuditEvent::JobCancelled {
                    job_id: job_id.to_string(),
                    cancelled_by: cancelled_by.to_string(),
                    previous_state: previous.state.state_type().to_string(),
                })
                .await;
        }
        if matches!(job.state, JobState::Cancelled { .. }) {
            metrics::JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
        }

        Ok(job)
    }

    /// Permanently delete a terminal job and its stored artifact.
    pub async fn delete(
        &self,
        job_id: &str,
        deleted_by: &str,
    ) -> Result<ExportJob, OrchestratorError> {
        let job = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if !job.state.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                operation: "delete".to_string(),
                actual: job.state.state_type().to_string(),
            });
        }

        if let JobState::Completed { result, .. } = &job.state {
            self.objects.delete(&result.storage_key).await?;
        }

        let deleted = self.jobs.delete(job_id)?;

        if let Some(audit) = &self.audit {
            audit
                .emit(AuditEvent::JobDeleted {
                    job_id: job_id.to_string(),
                    deleted_by: deleted_by.to_string(),
                    previous_state: deleted.state.state_type().to_string(),
                })
                .await;
        }

        Ok(deleted)
    }

    /// Spawn one worker loop task.
    fn spawn_worker(&self, worker: usize) {
        let running = Arc::clone(&self.running);
        let in_flight = Arc::clone(&self.in_flight);
        let jobs = Arc::clone(&self.jobs);
        let pipeline = Arc::clone(&self.pipeline);
        let audit = self.audit.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!(worker, "Export worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(worker, "Export worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(config.poll_interval_ms)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        // Drain the queue before going back to sleep.
                        loop {
                            match jobs.claim_next_pending() {
                                Ok(Some(job)) => {
                                    in_flight.fetch_add(1, Ordering::SeqCst);
                                    metrics::JOBS_IN_FLIGHT.inc();
                                    Self::process_claimed(worker, &job, &jobs, &pipeline, &audit, &config).await;
                                    in_flight.fetch_sub(1, Ordering::SeqCst);
                                    metrics::JOBS_IN_FLIGHT.dec();

                                    if !running.load(Ordering::Relaxed) {
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(worker, "Failed to claim job: {}", e);
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            info!(worker, "Export worker stopped");
        });
    }

    /// Spawn the reaper loop task.
    fn spawn_reaper(&self) {
        let running = Arc::clone(&self.running);
        let jobs = Arc::clone(&self.jobs);
        let audit = self.audit.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Reaper loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reaper loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(config.reaper_interval_ms)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        Self::reap_stale(&jobs, &audit, &config).await;
                    }
                }
            }
            info!("Reaper loop stopped");
        });
    }

    /// Run one claimed job through the pipeline and record the outcome.
    async fn process_claimed(
        worker: usize,
        job: &ExportJob,
        jobs: &Arc<dyn JobStore>,
        pipeline: &Arc<ExportPipeline>,
        audit: &Option<AuditHandle>,
        config: &OrchestratorConfig,
    ) {
        let started = std::time::Instant::now();
        info!(worker, job_id = %job.id, attempt = job.attempt, "processing export");

        if let Some(audit) = audit {
            audit
                .emit(AuditEvent::JobClaimed {
                    job_id: job.id.clone(),
                    worker,
                })
                .await;
        }

        // Keep the heartbeat fresh while the pipeline runs. Progress
        // updates only land at stage boundaries, which can be minutes
        // apart during a long encode.
        let ticker_jobs = Arc::clone(jobs);
        let ticker_id = job.id.clone();
        let ticker_interval = Duration::from_secs(config.heartbeat_interval_secs.max(1));
        let ticker = tokio::spawn(async move {
            loop {
                tokio::time::sleep(ticker_interval).await;
                if ticker_jobs.heartbeat(&ticker_id).is_err() {
                    break;
                }
            }
        });

        let outcome = match timeout(
            Duration::from_secs(config.job_timeout_secs),
            pipeline.run(job),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::Timeout {
                timeout_secs: config.job_timeout_secs,
            }),
        };
        ticker.abort();

        match outcome {
            Ok(result) => {
                metrics::JOBS_FINISHED.with_label_values(&["completed"]).inc();
                metrics::EXPORT_DURATION
                    .with_label_values(&["completed"])
                    .observe(started.elapsed().as_secs_f64());
                metrics::OUTPUT_SIZE_BYTES
                    .with_label_values(&[])
                    .observe(result.file_size_bytes as f64);

                if let Some(audit) = audit {
                    audit
                        .emit(AuditEvent::JobCompleted {
                            job_id: job.id.clone(),
                            storage_key: result.storage_key.clone(),
                            file_size_bytes: result.file_size_bytes,
                            duration_secs: result.duration_secs,
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        })
                        .await;
                }

                let new_state = JobState::Completed {
                    result,
                    completed_at: Utc::now(),
                };
                if let Err(e) = jobs.update_state(&job.id, new_state) {
                    warn!(job_id = %job.id, "Failed to record completion: {}", e);
                }
            }
            Err(PipelineError::Cancelled) => {
                info!(worker, job_id = %job.id, "export cancelled");
                metrics::JOBS_FINISHED.with_label_values(&["cancelled"]).inc();

                if let Err(e) = jobs.update_state(
                    &job.id,
                    JobState::Cancelled {
                        progress: 0,
                        cancelled_at: Utc::now(),
                    },
                ) {
                    warn!(job_id = %job.id, "Failed to record cancellation: {}", e);
                }
            }
            Err(e) => {
                let class = e.error_class();
                error!(worker, job_id = %job.id, class = %class, "export failed: {}", e);

                metrics::JOBS_FINISHED.with_label_values(&["failed"]).inc();
                metrics::JOB_FAILURES.with_label_values(&[class.as_str()]).inc();
                metrics::EXPORT_DURATION
                    .with_label_values(&["failed"])
                    .observe(started.elapsed().as_secs_f64());

                // The reaper may have already failed this job and scheduled
                // its successor; a rejected write means the outcome was
                // decided elsewhere and a second retry would double up.
                let recorded = match jobs.update_state(
                    &job.id,
                    JobState::Failed {
                        error: e.to_string(),
                        class,
                        progress: 0,
                        failed_at: Utc::now(),
                    },
                ) {
                    Ok(_) => true,
                    Err(store_err) => {
                        warn!(job_id = %job.id, "Failed to record failure: {}", store_err);
                        false
                    }
                };

                let retried = recorded && class.is_retryable() && job.attempt < config.max_attempts;
                if retried {
                    Self::schedule_retry(job, jobs, audit, config).await;
                }

                if let Some(audit) = audit {
                    audit
                        .emit(AuditEvent::JobFailed {
                            job_id: job.id.clone(),
                            error: e.to_string(),
                            class: class.as_str().to_string(),
                            retried,
                        })
                        .await;
                }
            }
        }
    }

    /// Create a successor job for a retryable failure.
    ///
    /// The successor gets a fresh id, attempt + 1 and a backoff before it
    /// becomes claimable. The ledger is not debited again.
    async fn schedule_retry(
        failed: &ExportJob,
        jobs: &Arc<dyn JobStore>,
        audit: &Option<AuditHandle>,
        config: &OrchestratorConfig,
    ) {
        let attempt = failed.attempt + 1;
        let delay_secs = config.backoff_secs(attempt);

        let request = CreateJobRequest {
            presentation_id: failed.presentation_id.clone(),
            requested_by: failed.requested_by.clone(),
            language: failed.language.clone(),
            settings: failed.settings.clone(),
            attempt,
            retry_of: Some(failed.id.clone()),
            available_at: Utc::now() + chrono::Duration::seconds(delay_secs as i64),
        };

        match jobs.create(request) {
            Ok(retry_job) => {
                info!(
                    job_id = %failed.id,
                    retry_job_id = %retry_job.id,
                    attempt,
                    delay_secs,
                    "retry scheduled"
                );
                metrics::RETRIES_SCHEDULED.inc();

                if let Some(audit) = audit {
                    audit
                        .emit(AuditEvent::RetryScheduled {
                            job_id: failed.id.clone(),
                            retry_job_id: retry_job.id.clone(),
                            attempt,
                            delay_secs,
                        })
                        .await;
                }
            }
            Err(e) => {
                error!(job_id = %failed.id, "Failed to schedule retry: {}", e);
            }
        }
    }

    /// Fail processing jobs whose heartbeat went stale.
    async fn reap_stale(
        jobs: &Arc<dyn JobStore>,
        audit: &Option<AuditHandle>,
        config: &OrchestratorConfig,
    ) {
        let cutoff = Utc::now() - chrono::Duration::seconds(config.heartbeat_stale_secs as i64);

        let stale = match jobs.list_stale(cutoff) {
            Ok(stale) => stale,
            Err(e) => {
                error!("Failed to list stale jobs: {}", e);
                return;
            }
        };

        for job in stale {
            let stale_secs = match &job.state {
                JobState::Processing { heartbeat_at, .. } => {
                    (Utc::now() - *heartbeat_at).num_seconds()
                }
                _ => continue,
            };

            warn!(job_id = %job.id, stale_secs, "reaping stale export job");
            metrics::JOBS_REAPED.inc();
            metrics::JOBS_FINISHED.with_label_values(&["failed"]).inc();
            metrics::JOB_FAILURES
                .with_label_values(&[ErrorClass::Timeout.as_str()])
                .inc();

            if let Err(e) = jobs.update_state(
                &job.id,
                JobState::Failed {
                    error: format!("worker heartbeat lost for {}s", stale_secs),
                    class: ErrorClass::Timeout,
                    progress: 0,
                    failed_at: Utc::now(),
                },
            ) {
                warn!(job_id = %job.id, "Failed to reap job: {}", e);
                continue;
            }

            if let Some(audit) = audit {
                audit
                    .emit(AuditEvent::JobReaped {
                        job_id: job.id.clone(),
                        stale_secs,
                    })
                    .await;
            }

            if job.attempt < config.max_attempts {
                Self::schedule_retry(&job, jobs, audit, config).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ExportPhase, ExportSettings, SqliteJobStore};
    use crate::pipeline::PipelineConfig;
    use crate::testing::{
        fixtures, MockBillingClient, MockEncoder, MockObjectStore, MockPresentationClient,
        MockRenderer,
    };

    struct Fixture {
        orchestrator: ExportOrchestrator,
        jobs: Arc<SqliteJobStore>,
        billing: Arc<MockBillingClient>,
        renderer: Arc<MockRenderer>,
        encoder: Arc<MockEncoder>,
        pipeline: Arc<ExportPipeline>,
        _work: tempfile::TempDir,
    }

    fn fixture(config: OrchestratorConfig) -> Fixture {
        let work = tempfile::tempdir().unwrap();
        let manifest =
            fixtures::manifest_with_chunks(&[(0.0, 2.0), (2.0, 4.0)], &work.path().join("chunks"));

        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let billing = Arc::new(MockBillingClient::new());
        let objects = Arc::new(MockObjectStore::new());
        let renderer = Arc::new(MockRenderer::new());
        let encoder = Arc::new(MockEncoder::new().with_audio_duration(4.0));

        let pipeline = Arc::new(ExportPipeline::new(
            Arc::new(MockPresentationClient::new(manifest)),
            renderer.clone(),
            encoder.clone(),
            objects.clone(),
            jobs.clone(),
            PipelineConfig {
                work_dir: work.path().to_path_buf(),
                ..PipelineConfig::default()
            },
        ));

        let orchestrator = ExportOrchestrator::new(
            config,
            jobs.clone(),
            billing.clone(),
            objects,
            pipeline.clone(),
            None,
        );

        Fixture {
            orchestrator,
            jobs,
            billing,
            renderer,
            encoder,
            pipeline,
            _work: work,
        }
    }

    fn fast_config() -> OrchestratorConfig {
        OrchestratorConfig {
            worker_count: 2,
            poll_interval_ms: 10,
            reaper_interval_ms: 50,
            retry_backoff_secs: 0,
            ..OrchestratorConfig::default()
        }
    }

    fn submit_request() -> SubmitRequest {
        SubmitRequest {
            presentation_id: "pres-1".to_string(),
            requested_by: "user-1".to_string(),
            language: "en".to_string(),
            settings: ExportSettings::default(),
        }
    }

    async fn wait_for_terminal(jobs: &SqliteJobStore, id: &str) -> JobState {
        for _ in 0..500 {
            let job = jobs.get(id).unwrap().unwrap();
            if job.state.is_terminal() {
                return job.state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", id);
    }

    #[tokio::test]
    async fn test_submit_creates_pending_and_debits_once() {
        let f = fixture(fast_config());

        let job = f.orchestrator.submit(submit_request()).await.unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempt, 1);
        assert_eq!(f.billing.debit_count(), 1);
    }

    #[tokio::test]
    async fn test_submit_insufficient_points_leaves_no_job() {
        let f = fixture(fast_config());
        f.billing.reject_with_insufficient_points();

        let err = f.orchestrator.submit(submit_request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Billing(_)));
        assert_eq!(
            f.jobs.count(&JobFilter::new()).unwrap(),
            0,
            "failed debit must not leave a job behind"
        );
    }

    #[tokio::test]
    async fn test_submit_rejected_when_queue_full() {
        let f = fixture(OrchestratorConfig {
            max_queue_depth: 2,
            ..fast_config()
        });

        f.orchestrator.submit(submit_request()).await.unwrap();
        f.orchestrator.submit(submit_request()).await.unwrap();
        let err = f.orchestrator.submit(submit_request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::QueueFull { depth: 2 }));
    }

    #[tokio::test]
    async fn test_worker_completes_job() {
        let f = fixture(fast_config());
        f.orchestrator.start().await;

        let job = f.orchestrator.submit(submit_request()).await.unwrap();
        let state = wait_for_terminal(&f.jobs, &job.id).await;

        match state {
            JobState::Completed { result, .. } => {
                assert_eq!(result.storage_key, format!("user-1/pres-1/{}.mp4", job.id));
                assert!(result.download_url.contains(&result.storage_key));
            }
            other => panic!("expected completion, got {:?}", other),
        }

        f.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_pool_drains_more_jobs_than_workers() {
        let f = fixture(fast_config());
        f.orchestrator.start().await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(f.orchestrator.submit(submit_request()).await.unwrap().id);
        }

        for id in &ids {
            let state = wait_for_terminal(&f.jobs, id).await;
            assert!(matches!(state, JobState::Completed { .. }));
        }
        assert_eq!(f.billing.debit_count(), 5);

        f.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_worker_count() {
        let f = fixture(OrchestratorConfig {
            worker_count: 3,
            poll_interval_ms: 10,
            retry_backoff_secs: 0,
            ..OrchestratorConfig::default()
        });
        // Slow captures keep jobs in flight long enough to observe overlap.
        f.renderer.set_delay(Duration::from_millis(150));
        f.orchestrator.start().await;

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(f.orchestrator.submit(submit_request()).await.unwrap().id);
        }

        let mut max_processing = 0i64;
        for _ in 0..800 {
            let processing = f
                .jobs
                .count(&JobFilter::new().with_state("processing"))
                .unwrap();
            max_processing = max_processing.max(processing);

            let completed = f
                .jobs
                .count(&JobFilter::new().with_state("completed"))
                .unwrap();
            if completed == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(
            max_processing <= 3,
            "observed {} jobs processing with 3 workers",
            max_processing
        );
        assert!(max_processing >= 2, "workers never overlapped");
        assert_eq!(
            f.jobs.count(&JobFilter::new().with_state("completed")).unwrap(),
            5
        );

        f.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_job_exceeding_wall_clock_budget_times_out() {
        let f = fixture(OrchestratorConfig {
            job_timeout_secs: 0,
            retry_backoff_secs: 0,
            ..fast_config()
        });
        f.renderer.set_delay(Duration::from_secs(30));

        f.orchestrator.submit(submit_request()).await.unwrap();
        let claimed = f.jobs.claim_next_pending().unwrap().unwrap();

        ExportOrchestrator::process_claimed(
            0,
            &claimed,
            &(f.jobs.clone() as Arc<dyn JobStore>),
            &f.pipeline,
            &None,
            &f.orchestrator.config,
        )
        .await;

        let job = f.jobs.get(&claimed.id).unwrap().unwrap();
        assert!(matches!(
            job.state,
            JobState::Failed {
                class: ErrorClass::Timeout,
                ..
            }
        ));

        // Timeouts are retryable, so a successor is queued.
        let pending = f.jobs.list(&JobFilter::new().with_state("pending")).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempt, 2);
        assert_eq!(pending[0].retry_of, Some(claimed.id));
    }

    #[tokio::test]
    async fn test_heartbeat_stays_fresh_during_slow_stage() {
        let f = fixture(OrchestratorConfig {
            heartbeat_interval_secs: 1,
            ..fast_config()
        });
        // The first capture blocks long enough that no progress update
        // lands; only the worker's ticker can keep the heartbeat alive.
        f.renderer.set_delay(Duration::from_secs(10));
        f.orchestrator.start().await;

        let job = f.orchestrator.submit(submit_request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let current = f.jobs.get(&job.id).unwrap().unwrap();
        match current.state {
            JobState::Processing { heartbeat_at, started_at, .. } => {
                assert!((Utc::now() - started_at).num_milliseconds() > 2000);
                assert!(
                    (Utc::now() - heartbeat_at).num_milliseconds() < 1500,
                    "heartbeat went stale mid-capture"
                );
            }
            other => panic!("expected a processing job, got {:?}", other),
        }

        f.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_no_duplicate_successor_when_job_failed_underneath_worker() {
        let f = fixture(OrchestratorConfig {
            retry_backoff_secs: 0,
            ..fast_config()
        });
        // The slideshow build stalls, then fails retryably.
        f.encoder.delay_slideshow(Duration::from_millis(300));
        f.encoder.fail_slideshow("disk hiccup");

        f.orchestrator.submit(submit_request()).await.unwrap();
        let claimed = f.jobs.claim_next_pending().unwrap().unwrap();

        let jobs_dyn = f.jobs.clone() as Arc<dyn JobStore>;
        let worker = tokio::spawn({
            let jobs_dyn = jobs_dyn.clone();
            let pipeline = f.pipeline.clone();
            let config = f.orchestrator.config.clone();
            let claimed = claimed.clone();
            async move {
                ExportOrchestrator::process_claimed(0, &claimed, &jobs_dyn, &pipeline, &None, &config)
                    .await;
            }
        });

        // While the worker sits in the encode stage, the reaper decides
        // the job is dead and records the failure plus a successor.
        tokio::time::sleep(Duration::from_millis(150)).await;
        f.jobs
            .update_state(
                &claimed.id,
                JobState::Failed {
                    error: "worker heartbeat lost for 999s".to_string(),
                    class: ErrorClass::Timeout,
                    progress: 0,
                    failed_at: Utc::now(),
                },
            )
            .unwrap();
        ExportOrchestrator::schedule_retry(&claimed, &jobs_dyn, &None, &f.orchestrator.config).await;

        worker.await.unwrap();

        // The worker's own failure cannot land on the terminal record, so
        // it must not queue a second successor on top of the reaper's.
        let pending = f.jobs.list(&JobFilter::new().with_state("pending")).unwrap();
        assert_eq!(pending.len(), 1, "exactly one successor");
        assert_eq!(f.jobs.count(&JobFilter::new()).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retryable_failure_schedules_successor() {
        let f = fixture(fast_config());
        f.encoder.fail_slideshow("disk hiccup");
        f.orchestrator.start().await;

        let job = f.orchestrator.submit(submit_request()).await.unwrap();
        let state = wait_for_terminal(&f.jobs, &job.id).await;
        assert!(matches!(
            state,
            JobState::Failed {
                class: ErrorClass::EncodeFailure,
                ..
            }
        ));

        // The successor carries attempt + 1 and points back at the
        // failed job. With max_attempts = 3 the chain ends at attempt 3.
        for _ in 0..500 {
            let retries = f
                .jobs
                .list(&JobFilter::new().with_state("failed"))
                .unwrap();
            if retries.len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let failed = f.jobs.list(&JobFilter::new().with_state("failed")).unwrap();
        assert_eq!(failed.len(), 3, "three attempts, all failed");
        let attempts: Vec<u32> = {
            let mut a: Vec<u32> = failed.iter().map(|j| j.attempt).collect();
            a.sort_unstable();
            a
        };
        assert_eq!(attempts, vec![1, 2, 3]);
        let last = failed.iter().find(|j| j.attempt == 3).unwrap();
        assert!(last.retry_of.is_some());

        // Submission was billed once, retries never re-debit.
        assert_eq!(f.billing.debit_count(), 1);

        f.orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let f = fixture(fast_config());

        let job = f.orchestrator.submit(submit_request()).await.unwrap();
        let cancelled = f.orchestrator.cancel(&job.id, "user-1").await.unwrap();
        assert!(matches!(cancelled.state, JobState::Cancelled { .. }));

        // Cancelling a terminal job is rejected.
        let err = f.orchestrator.cancel(&job.id, "user-1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_delete_completed_job_removes_artifact() {
        let f = fixture(fast_config());
        f.orchestrator.start().await;

        let job = f.orchestrator.submit(submit_request()).await.unwrap();
        wait_for_terminal(&f.jobs, &job.id).await;
        f.orchestrator.stop().await;

        let deleted = f.orchestrator.delete(&job.id, "user-1").await.unwrap();
        assert!(matches!(deleted.state, JobState::Completed { .. }));
        assert!(f.jobs.get(&job.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_rejects_non_terminal() {
        let f = fixture(fast_config());

        let job = f.orchestrator.submit(submit_request()).await.unwrap();
        let err = f.orchestrator.delete(&job.id, "user-1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_reaper_fails_stale_job_and_retries() {
        let f = fixture(OrchestratorConfig {
            heartbeat_stale_secs: 60,
            ..fast_config()
        });

        // A job claimed by a worker that then died: heartbeat is old.
        f.orchestrator.submit(submit_request()).await.unwrap();
        let claimed = f.jobs.claim_next_pending().unwrap().unwrap();
        let stale_at = Utc::now() - chrono::Duration::seconds(300);
        f.jobs
            .update_state(
                &claimed.id,
                JobState::Processing {
                    phase: ExportPhase::Rendering,
                    progress: 20,
                    started_at: stale_at,
                    heartbeat_at: stale_at,
                },
            )
            .unwrap();

        ExportOrchestrator::reap_stale(
            &(f.jobs.clone() as Arc<dyn JobStore>),
            &None,
            &f.orchestrator.config,
        )
        .await;

        let reaped = f.jobs.get(&claimed.id).unwrap().unwrap();
        assert!(matches!(
            reaped.state,
            JobState::Failed {
                class: ErrorClass::Timeout,
                ..
            }
        ));

        let pending = f.jobs.list(&JobFilter::new().with_state("pending")).unwrap();
        assert_eq!(pending.len(), 1, "reaped job gets a successor");
        assert_eq!(pending[0].attempt, 2);
        assert_eq!(pending[0].retry_of, Some(claimed.id));
    }

    #[tokio::test]
    async fn test_status_counts() {
        let f = fixture(fast_config());

        f.orchestrator.submit(submit_request()).await.unwrap();
        f.orchestrator.submit(submit_request()).await.unwrap();

        let status = f.orchestrator.status().await;
        assert!(!status.running);
        assert_eq!(status.worker_count, 2);
        assert_eq!(status.pending_count, 2);
        assert_eq!(status.processing_count, 0);
    }
}
