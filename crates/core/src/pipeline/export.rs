//! The export pipeline: manifest to uploaded video, one job at a time.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::PipelineConfig;
use super::error::PipelineError;
use crate::audit::{AuditEvent, AuditHandle};
use crate::encoder::{Encoder, SlideFrame};
use crate::job::{ExportJob, ExportPhase, ExportResult, JobState, JobStore};
use crate::presentation::{AudioChunkRef, PresentationClient, PresentationManifest};
use crate::renderer::Renderer;
use crate::storage::{export_key, ObjectStore};
use crate::timing::{resolve_display_durations, total_display_secs};

/// Progress value at the start of each phase. The remaining span up to
/// the next phase's start is interpolated within the phase.
fn phase_floor(phase: ExportPhase) -> u8 {
    match phase {
        ExportPhase::Loading => 0,
        ExportPhase::Rendering => 10,
        ExportPhase::Encoding => 45,
        ExportPhase::Merging => 75,
        ExportPhase::Uploading => 85,
    }
}

/// Drives one export job from manifest fetch to uploaded video.
///
/// All external effects go through trait objects so tests can run the
/// whole flow against in-memory fakes.
pub struct ExportPipeline {
    presentations: Arc<dyn PresentationClient>,
    renderer: Arc<dyn Renderer>,
    encoder: Arc<dyn Encoder>,
    objects: Arc<dyn ObjectStore>,
    jobs: Arc<dyn JobStore>,
    audit: Option<AuditHandle>,
    http: reqwest::Client,
    config: PipelineConfig,
}

impl ExportPipeline {
    pub fn new(
        presentations: Arc<dyn PresentationClient>,
        renderer: Arc<dyn Renderer>,
        encoder: Arc<dyn Encoder>,
        objects: Arc<dyn ObjectStore>,
        jobs: Arc<dyn JobStore>,
        config: PipelineConfig,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.chunk_fetch_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            presentations,
            renderer,
            encoder,
            objects,
            jobs,
            audit: None,
            http,
            config,
        }
    }

    /// Attach an audit handle so phase transitions are recorded.
    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Runs the full pipeline for one claimed job.
    ///
    /// The job's working directory is removed on every exit path,
    /// success, failure and cancellation alike. The stored export (if
    /// any) is the only artifact that survives.
    pub async fn run(&self, job: &ExportJob) -> Result<ExportResult, PipelineError> {
        let work_dir = self.config.work_dir.join(&job.id);
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self.run_in(job, &work_dir).await;

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            warn!(job_id = %job.id, error = %e, "failed to remove working directory");
        }

        result
    }

    async fn run_in(&self, job: &ExportJob, work_dir: &Path) -> Result<ExportResult, PipelineError> {
        // Loading: 0-10.
        self.checkpoint(job)?;
        self.set_progress(job, ExportPhase::Loading, 0)?;

        let manifest = self
            .presentations
            .fetch(&job.presentation_id, &job.language)
            .await
            .map_err(|e| PipelineError::load(e.to_string()))?;

        if manifest.slides.is_empty() {
            return Err(PipelineError::load(format!(
                "presentation {} has no slides",
                job.presentation_id
            )));
        }

        let durations = resolve_display_durations(&manifest.slides, self.config.timing);
        let expected_secs = total_display_secs(&durations);
        info!(
            job_id = %job.id,
            slides = manifest.slides.len(),
            expected_secs,
            "manifest loaded"
        );
        self.set_progress(job, ExportPhase::Loading, phase_floor(ExportPhase::Rendering))?;

        // Rendering: 10-45, one capture per slide with a cancellation
        // checkpoint between slides.
        let frames = self
            .render_frames(job, &manifest, &durations, work_dir)
            .await?;

        // Encoding: 45-75. The slideshow and the narration track are
        // independent until the mux, so build them concurrently.
        self.checkpoint(job)?;
        self.set_progress(job, ExportPhase::Encoding, phase_floor(ExportPhase::Encoding))?;

        let video_path = work_dir.join("slideshow.mp4");
        let audio_path = work_dir.join("narration.m4a");
        let chunks = manifest.audio_chunks();

        let (video, audio) = tokio::join!(
            self.encoder
                .build_slideshow(&frames, &job.settings, &video_path),
            self.build_audio_track(job, &chunks, work_dir, &audio_path),
        );
        let video = video?;
        let audio = audio?;

        self.set_progress(job, ExportPhase::Encoding, phase_floor(ExportPhase::Merging))?;

        let output = match audio {
            Some(audio) => {
                // The narration track must line up with the resolved slide
                // durations; a divergence means the timings are stale.
                let drift = (audio.duration_secs - expected_secs).abs();
                if expected_secs > 0.0 && drift > self.config.timing_tolerance * expected_secs {
                    return Err(PipelineError::TimingMismatch {
                        expected_secs,
                        actual_secs: audio.duration_secs,
                    });
                }

                // Merging: 75-85.
                self.checkpoint(job)?;
                self.set_progress(job, ExportPhase::Merging, phase_floor(ExportPhase::Merging))?;
                let out_path = work_dir.join("export.mp4");
                self.encoder
                    .mux(&video.path, &audio.path, &job.settings, &out_path)
                    .await?
            }
            None => {
                debug!(job_id = %job.id, "no narration audio, exporting silent video");
                video
            }
        };

        // Uploading: 85-100.
        self.checkpoint(job)?;
        self.set_progress(job, ExportPhase::Uploading, phase_floor(ExportPhase::Uploading))?;

        let key = export_key(&job.requested_by, &job.presentation_id, &job.id);
        let stored = self.objects.put(&key, &output.path).await?;
        let download_url = self.objects.signed_url(&key).await?;

        info!(
            job_id = %job.id,
            key = %key,
            size_bytes = stored.size_bytes,
            duration_secs = output.duration_secs,
            "export uploaded"
        );

        Ok(ExportResult {
            download_url,
            storage_key: key,
            file_size_bytes: stored.size_bytes,
            duration_secs: output.duration_secs,
        })
    }

    async fn render_frames(
        &self,
        job: &ExportJob,
        manifest: &PresentationManifest,
        durations: &[f64],
        work_dir: &Path,
    ) -> Result<Vec<SlideFrame>, PipelineError> {
        let frames_dir = work_dir.join("frames");
        tokio::fs::create_dir_all(&frames_dir).await?;

        let total = manifest.slides.len();
        let mut frames = Vec::with_capacity(total);

        for (i, slide) in manifest.slides.iter().enumerate() {
            self.checkpoint(job)?;

            let image_path = frames_dir.join(format!("slide-{:04}.png", slide.index));
            self.renderer
                .capture_slide(
                    &manifest.render_url,
                    slide.index,
                    job.settings.resolution,
                    &image_path,
                )
                .await?;

            frames.push(SlideFrame {
                index: slide.index,
                image_path,
                display_secs: durations[i],
            });

            let span = phase_floor(ExportPhase::Encoding) - phase_floor(ExportPhase::Rendering);
            let progress = phase_floor(ExportPhase::Rendering)
                + (span as usize * (i + 1) / total) as u8;
            self.set_progress(job, ExportPhase::Rendering, progress)?;
        }

        crate::metrics::SLIDES_RENDERED
            .with_label_values(&[])
            .observe(frames.len() as f64);

        Ok(frames)
    }

    /// Downloads the narration chunks and splices them into one track.
    /// Returns `None` for presentations without narration audio.
    async fn build_audio_track(
        &self,
        job: &ExportJob,
        chunks: &[AudioChunkRef],
        work_dir: &Path,
        output: &Path,
    ) -> Result<Option<crate::encoder::EncodedTrack>, PipelineError> {
        if chunks.is_empty() {
            return Ok(None);
        }

        let audio_dir = work_dir.join("audio");
        tokio::fs::create_dir_all(&audio_dir).await?;

        let mut parts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let dest = audio_dir.join(format!("chunk-{:04}", chunk.index));
            self.fetch_chunk(&chunk.url, &dest).await?;
            parts.push(dest);
        }

        debug!(job_id = %job.id, parts = parts.len(), "narration chunks fetched");
        let track = self.encoder.concat_audio(&parts, output).await?;
        Ok(Some(track))
    }

    async fn fetch_chunk(&self, url: &str, dest: &Path) -> Result<(), PipelineError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| PipelineError::load(format!("fetch {}: {}", url, e)))?;
            if !response.status().is_success() {
                return Err(PipelineError::load(format!(
                    "fetch {}: status {}",
                    url,
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| PipelineError::load(format!("fetch {}: {}", url, e)))?;
            tokio::fs::write(dest, &bytes).await?;
        } else {
            // Local chunk paths are produced by the narration system when
            // it shares a volume with us.
            tokio::fs::copy(url, dest).await?;
        }
        Ok(())
    }

    /// Cancellation checkpoint: aborts if the user asked to cancel or
    /// the record was externally moved to a terminal state.
    fn checkpoint(&self, job: &ExportJob) -> Result<(), PipelineError> {
        let current = self
            .jobs
            .get(&job.id)
            .map_err(|e| PipelineError::Store(e.to_string()))?
            .ok_or_else(|| PipelineError::Store(format!("job {} disappeared", job.id)))?;

        if current.cancel_requested || current.state.is_terminal() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn set_progress(
        &self,
        job: &ExportJob,
        phase: ExportPhase,
        progress: u8,
    ) -> Result<(), PipelineError> {
        let current = self
            .jobs
            .get(&job.id)
            .map_err(|e| PipelineError::Store(e.to_string()))?
            .map(|j| j.state);
        let (started_at, previous_phase) = match current {
            Some(JobState::Processing { started_at, phase, .. }) => (started_at, Some(phase)),
            _ => (Utc::now(), None),
        };

        // One audit event per phase transition, not per progress tick.
        if previous_phase != Some(phase) {
            if let Some(audit) = &self.audit {
                audit.try_emit(AuditEvent::PhaseChanged {
                    job_id: job.id.clone(),
                    phase: phase.to_string(),
                    progress,
                });
            }
        }

        self.jobs
            .update_state(
                &job.id,
                JobState::Processing {
                    phase,
                    progress,
                    started_at,
                    heartbeat_at: Utc::now(),
                },
            )
            .map_err(|e| PipelineError::Store(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{CreateJobRequest, ExportSettings, SqliteJobStore};
    use crate::testing::{
        fixtures, MockEncoder, MockObjectStore, MockPresentationClient, MockRenderer,
    };

    struct Fixture {
        pipeline: ExportPipeline,
        jobs: Arc<SqliteJobStore>,
        objects: Arc<MockObjectStore>,
        renderer: Arc<MockRenderer>,
        encoder: Arc<MockEncoder>,
        _work: tempfile::TempDir,
    }

    fn fixture(spans: &[(f64, f64)], with_audio: bool, audio_duration_secs: f64) -> Fixture {
        let work = tempfile::tempdir().unwrap();
        let manifest = if with_audio {
            fixtures::manifest_with_chunks(spans, &work.path().join("chunks"))
        } else {
            fixtures::manifest(spans)
        };

        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let objects = Arc::new(MockObjectStore::new());
        let renderer = Arc::new(MockRenderer::new());
        let encoder = Arc::new(MockEncoder::new().with_audio_duration(audio_duration_secs));

        let pipeline = ExportPipeline::new(
            Arc::new(MockPresentationClient::new(manifest)),
            renderer.clone(),
            encoder.clone(),
            objects.clone(),
            jobs.clone(),
            PipelineConfig {
                work_dir: work.path().to_path_buf(),
                ..PipelineConfig::default()
            },
        );

        Fixture {
            pipeline,
            jobs,
            objects,
            renderer,
            encoder,
            _work: work,
        }
    }

    fn claimed_job(jobs: &SqliteJobStore) -> ExportJob {
        jobs.create(CreateJobRequest::new(
            "pres-1",
            "user-1",
            "en",
            ExportSettings::default(),
        ))
        .unwrap();
        jobs.claim_next_pending().unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_three_slides() {
        // Spans [0,2], [2,5.5], [5.5,6.5] resolve to 2.0 + 3.5 + 1.0 = 6.5s.
        let f = fixture(&[(0.0, 2.0), (2.0, 5.5), (5.5, 6.5)], true, 6.5);
        let job = claimed_job(&f.jobs);

        let result = f.pipeline.run(&job).await.unwrap();

        assert_eq!(result.storage_key, format!("user-1/pres-1/{}.mp4", job.id));
        assert!(result.download_url.contains(&result.storage_key));
        assert_eq!(f.renderer.capture_count(), 3);
        assert_eq!(f.objects.put_count(), 1);
        // Durations handed to the slideshow builder match the spans.
        assert_eq!(f.encoder.slideshow_durations(), vec![2.0, 3.5, 1.0]);
    }

    #[tokio::test]
    async fn test_timing_mismatch_fails_before_mux() {
        // Slides total 6.5s but the narration track probes at 8.0s.
        let f = fixture(&[(0.0, 2.0), (2.0, 5.5), (5.5, 6.5)], true, 8.0);
        let job = claimed_job(&f.jobs);

        let err = f.pipeline.run(&job).await.unwrap_err();
        assert!(matches!(err, PipelineError::TimingMismatch { .. }));
        assert_eq!(err.error_class(), crate::job::ErrorClass::TimingMismatch);
        assert_eq!(f.encoder.mux_count(), 0);
        assert_eq!(f.objects.put_count(), 0);
    }

    #[tokio::test]
    async fn test_within_tolerance_passes() {
        // 6.55s narration against 6.5s of slides is within the 1% band.
        let f = fixture(&[(0.0, 2.0), (2.0, 5.5), (5.5, 6.5)], true, 6.55);
        let job = claimed_job(&f.jobs);

        f.pipeline.run(&job).await.unwrap();
        assert_eq!(f.encoder.mux_count(), 1);
    }

    #[tokio::test]
    async fn test_no_audio_skips_mux() {
        let f = fixture(&[(0.0, 3.0)], false, 0.0);
        let job = claimed_job(&f.jobs);

        let result = f.pipeline.run(&job).await.unwrap();
        assert_eq!(f.encoder.mux_count(), 0);
        assert_eq!(f.objects.put_count(), 1);
        assert!(!result.download_url.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_render_stops_capture() {
        let f = fixture(&[(0.0, 2.0), (2.0, 4.0), (4.0, 6.0)], false, 0.0);
        let job = claimed_job(&f.jobs);

        // Cancel after the first capture.
        f.renderer.fail_after(1);
        f.jobs.request_cancel(&job.id).unwrap();

        let err = f.pipeline.run(&job).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        // The checkpoint before the first capture already sees the flag.
        assert_eq!(f.renderer.capture_count(), 0);
    }

    #[tokio::test]
    async fn test_work_dir_removed_on_failure() {
        let f = fixture(&[(0.0, 2.0)], true, 8.0);
        let job = claimed_job(&f.jobs);
        let work_dir = f._work.path().join(&job.id);

        let _ = f.pipeline.run(&job).await;
        assert!(!work_dir.exists());
    }

    #[tokio::test]
    async fn test_empty_presentation_rejected() {
        let f = fixture(&[], false, 0.0);
        let job = claimed_job(&f.jobs);

        let err = f.pipeline.run(&job).await.unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
        assert_eq!(err.error_class(), crate::job::ErrorClass::RenderFailure);
    }

    #[tokio::test]
    async fn test_progress_reaches_uploading() {
        let f = fixture(&[(0.0, 2.0), (2.0, 4.0)], true, 4.0);
        let job = claimed_job(&f.jobs);

        f.pipeline.run(&job).await.unwrap();

        let current = f.jobs.get(&job.id).unwrap().unwrap();
        match current.state {
            JobState::Processing { phase, progress, .. } => {
                assert_eq!(phase, ExportPhase::Uploading);
                assert!(progress >= 85);
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }
}
