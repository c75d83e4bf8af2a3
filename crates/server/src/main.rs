use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slidecast_core::audit::{create_audit_system, AuditEvent, AuditStore, SqliteAuditStore};
use slidecast_core::encoder::{Encoder, FfmpegEncoder};
use slidecast_core::job::{JobStore, SqliteJobStore};
use slidecast_core::presentation::{HttpBillingClient, HttpPresentationClient};
use slidecast_core::renderer::{ChromiumRenderer, Renderer};
use slidecast_core::storage::{FsObjectStore, ObjectStore};
use slidecast_core::{load_config, validate_config, ExportOrchestrator, ExportPipeline};

use slidecast_server::api::create_router;
use slidecast_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SLIDECAST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Presentation API: {}", config.presentation_api.url);
    info!("Database path: {:?}", config.database.path);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create SQLite audit store
    let audit_store: Arc<dyn AuditStore> =
        Arc::new(SqliteAuditStore::new(&config.audit.path).context("Failed to create audit store")?);
    info!("Audit store initialized");

    // Create SQLite job store
    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    info!("Job store initialized");

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), config.audit.buffer_size);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Emit ServiceStarted event
    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // Create external service clients
    let presentations = Arc::new(HttpPresentationClient::new(config.presentation_api.clone()));
    let billing = Arc::new(HttpBillingClient::new(config.billing_api.clone()));

    // Create the capture surface and the encoder
    let renderer = Arc::new(ChromiumRenderer::new(config.renderer.clone()));
    if let Err(e) = renderer.validate().await {
        warn!("Renderer toolchain validation failed: {}", e);
    }
    let encoder = Arc::new(FfmpegEncoder::new(config.encoder.clone()));
    if let Err(e) = encoder.validate().await {
        warn!("Encoder toolchain validation failed: {}", e);
    }

    // Create the object store
    let objects = Arc::new(FsObjectStore::new(config.storage.clone()));
    if let Err(e) = objects.validate().await {
        warn!("Object store validation failed: {}", e);
    }

    // Create export pipeline
    let pipeline = Arc::new(
        ExportPipeline::new(
            presentations,
            renderer,
            encoder,
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
        billing,
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
        pipeline,
        Some(audit_handle.clone()),
    ));

    if config.orchestrator.enabled {
        orchestrator.start().await;
        info!("Export orchestrator started");
    } else {
        info!("Orchestrator disabled in config, submitted jobs will stay pending");
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        audit_handle.clone(),
        audit_store,
        job_store,
        Arc::clone(&orchestrator),
        objects,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop orchestrator
    info!("Stopping orchestrator...");
    orchestrator.stop().await;
    info!("Orchestrator stopped");

    // Emit ServiceStopped event
    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // Drop all holders of AuditHandle so the writer's channel closes.
    // The orchestrator holds an AuditHandle clone, so we must drop it.
    // Order matters: we emit the final event BEFORE dropping handles.
    drop(orchestrator);
    drop(audit_handle);

    // Wait for writer to finish processing remaining events
    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
