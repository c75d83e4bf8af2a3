//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock dependencies injected, enabling comprehensive E2E testing
//! without a browser, ffmpeg or external APIs. The job store, audit
//! store and object store are real, backed by a temp directory.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use slidecast_core::audit::{create_audit_system, AuditStore, SqliteAuditStore};
use slidecast_core::encoder::Encoder;
use slidecast_core::job::{JobStore, SqliteJobStore};
use slidecast_core::presentation::BillingClient;
use slidecast_core::renderer::Renderer;
use slidecast_core::storage::{FsObjectStore, ObjectStore};
use slidecast_core::testing::{
    MockBillingClient, MockEncoder, MockPresentationClient, MockRenderer,
};
use slidecast_core::{
    load_config_from_str, Config, ExportOrchestrator, ExportPipeline, OrchestratorConfig,
};

/// Re-export fixtures for test convenience
pub use slidecast_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/exports", json!({
///         "presentation_id": "pres-1"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock capture surface
    pub renderer: Arc<MockRenderer>,
    /// Mock encoder - configure the probed narration duration
    pub encoder: Arc<MockEncoder>,
    /// Mock points ledger
    pub billing: Arc<MockBillingClient>,
    /// The orchestrator (started according to TestConfig)
    pub orchestrator: Arc<ExportOrchestrator>,
    /// Temporary directory for databases, work dir and object store
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with the orchestrator running.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        // Manifest served by the mock presentation client: one slide per
        // span, with narration chunk files written under the temp dir.
        let manifest = fixtures::manifest_with_chunks(
            &test_config.narration_spans,
            &temp_dir.path().join("chunks"),
        );

        // Create mocks
        let renderer = Arc::new(MockRenderer::new());
        let encoder =
            Arc::new(MockEncoder::new().with_audio_duration(test_config.audio_duration_secs));
        let billing = Arc::new(MockBillingClient::new());
        let presentations = Arc::new(MockPresentationClient::new(manifest));

        // Create config pointing all paths at the temp dir
        let mut config: Config = load_config_from_str(
            r#"
[presentation_api]
url = "http://docs.local"

[billing_api]
url = "http://ledger.local"
"#,
        )
        .expect("Failed to build test config");
        config.database.path = temp_dir.path().join("test.db");
        config.audit.path = temp_dir.path().join("test-audit.db");
        config.storage.root_dir = temp_dir.path().join("exports");
        config.pipeline.work_dir = temp_dir.path().join("work");
        config.orchestrator = OrchestratorConfig {
            worker_count: 2,
            poll_interval_ms: 10,
            reaper_interval_ms: 50,
            retry_backoff_secs: 0,
            max_queue_depth: test_config.max_queue_depth,
            ..Default::default()
        };

        // Create stores
        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&config.audit.path).expect("Failed to create audit store"),
        );
        let job_store: Arc<dyn JobStore> = Arc::new(
            SqliteJobStore::new(&config.database.path).expect("Failed to create job store"),
        );
        let objects = Arc::new(FsObjectStore::new(config.storage.clone()));

        // Create audit system
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);

        // Spawn audit writer
        tokio::spawn(audit_writer.run());

        // Create pipeline with mocks
        let pipeline = Arc::new(
            ExportPipeline::new(
                presentations,
                Arc::clone(&renderer) as Arc<dyn Renderer>,
                Arc::clone(&encoder) as Arc<dyn Encoder>,
                Arc::clone(&objects) as Arc<dyn ObjectStore>,
                Arc::clone(&job_store),
                config.pipeline.clone(),
            )
            .with_audit(audit_handle.clone()),
        );

        // Create orchestrator
        let orchestrator = Arc::new(ExportOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&job_store),
            Arc::clone(&billing) as Arc<dyn BillingClient>,
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
            pipeline,
            Some(audit_handle.clone()),
        ));

        if test_config.start_orchestrator {
            orchestrator.start().await;
        }

        // Create app state and router
        let state = Arc::new(slidecast_server::state::AppState::new(
            config,
            audit_handle,
            audit_store,
            job_store,
            Arc::clone(&orchestrator),
            objects,
        ));

        let router = slidecast_server::api::create_router(state);

        Self {
            router,
            renderer,
            encoder,
            billing,
            orchestrator,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a GET request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).to_string())
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Submit an export for `presentation_id` as `user-1`, returning the job id.
    pub async fn submit(&self, presentation_id: &str) -> String {
        let response = self
            .post(
                "/api/v1/exports",
                serde_json::json!({
                    "presentation_id": presentation_id,
                    "requested_by": "user-1",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"].as_str().expect("job id").to_string()
    }

    /// Poll the job until it reaches a terminal state, returning the snapshot.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Value {
        for _ in 0..500 {
            let response = self.get(&format!("/api/v1/exports/{}", job_id)).await;
            assert_eq!(response.status, StatusCode::OK);
            let state_type = response.body["state"]["type"].as_str().unwrap_or("");
            if ["completed", "failed", "cancelled"].contains(&state_type) {
                return response.body;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", job_id);
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Narration spans, one slide per span
    pub narration_spans: Vec<(f64, f64)>,
    /// Duration the mock encoder probes for the spliced narration track
    pub audio_duration_secs: f64,
    /// Start the orchestrator workers
    pub start_orchestrator: bool,
    /// Pending queue bound
    pub max_queue_depth: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            narration_spans: vec![(0.0, 2.0), (2.0, 5.5), (5.5, 6.5)],
            audio_duration_secs: 6.5,
            start_orchestrator: true,
            max_queue_depth: 100,
        }
    }
}

impl TestConfig {
    /// Config with the orchestrator left stopped, so jobs stay pending.
    pub fn idle() -> Self {
        Self {
            start_orchestrator: false,
            ..Self::default()
        }
    }
}
