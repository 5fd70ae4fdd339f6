use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conveyor_core::dedup::DedupStore;
use conveyor_core::stages::{
    CollectStage, ContentSource, DigestGenerator, HtmlRenderer, HttpContentSource, ProcessStage,
    PublishStage, Publisher, RenderStage, SiteRenderer,
};
use conveyor_core::{
    create_audit_system, create_authenticator, load_config, validate_config, ArticleGenerator,
    ArtifactStore, AuditEvent, AuditStore, Authenticator, ContentDeduplicator, FsArtifactStore,
    FsPublisher, QueueTransport, SqliteAuditStore, SqliteDedupStore, SqliteQueue, StageHandler,
    StageKind, StageWorker,
};

use conveyor_server::api::create_router;
use conveyor_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

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
    let config_path = std::env::var("CONVEYOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);
    info!("Configured sources: {}", config.sources.len());

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // Create SQLite-backed stores (one database file, separate tables)
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    let queue: Arc<dyn QueueTransport> = Arc::new(
        SqliteQueue::new(&config.database.path).context("Failed to create queue transport")?,
    );
    info!("Queue transport initialized");

    let dedup_records: Arc<dyn DedupStore> = Arc::new(
        SqliteDedupStore::new(&config.database.path).context("Failed to create dedup store")?,
    );
    info!("Dedup record store initialized");

    // Artifact store
    let artifacts: Arc<dyn ArtifactStore> =
        Arc::new(FsArtifactStore::new(config.artifact_store.root.clone()));
    info!("Artifact store rooted at {:?}", config.artifact_store.root);

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Emit ServiceStarted event
    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // Content collaborators
    let content_source: Arc<dyn ContentSource> = Arc::new(
        HttpContentSource::with_defaults()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .context("Failed to create content source")?,
    );
    let generator: Arc<dyn ArticleGenerator> = Arc::new(DigestGenerator::new());
    let renderer: Arc<dyn SiteRenderer> = Arc::new(HtmlRenderer::new());
    let publisher: Arc<dyn Publisher> = Arc::new(FsPublisher::new(config.publish.root.clone()));

    let deduplicator = Arc::new(ContentDeduplicator::new(
        Arc::clone(&dedup_records),
        Arc::clone(&artifacts),
    ));

    // Build one handler per stage
    let handlers: Vec<(StageKind, Arc<dyn StageHandler>)> = vec![
        (
            StageKind::Collect,
            Arc::new(CollectStage::new(
                config.sources.clone(),
                Arc::clone(&content_source),
                Arc::clone(&deduplicator),
                Arc::clone(&queue),
            )),
        ),
        (
            StageKind::Process,
            Arc::new(ProcessStage::new(
                Arc::clone(&artifacts),
                Arc::clone(&generator),
                Arc::clone(&deduplicator),
                Arc::clone(&queue),
            )),
        ),
        (
            StageKind::Render,
            Arc::new(RenderStage::new(
                Arc::clone(&artifacts),
                Arc::clone(&renderer),
                Arc::clone(&deduplicator),
                Arc::clone(&queue),
            )),
        ),
        (
            StageKind::Publish,
            Arc::new(PublishStage::new(
                Arc::clone(&artifacts),
                Arc::clone(&publisher),
                Arc::clone(&dedup_records),
                Arc::clone(&queue),
            )),
        ),
    ];

    // Start a worker per enabled stage
    let mut workers = Vec::new();
    for (stage, handler) in handlers {
        let stage_config = match stage {
            StageKind::Collect => &config.pipeline.collect,
            StageKind::Process => &config.pipeline.process,
            StageKind::Render => &config.pipeline.render,
            StageKind::Publish => &config.pipeline.publish,
        };

        if !stage_config.enabled {
            info!(stage = stage.as_str(), "stage disabled in config");
            continue;
        }

        let worker = Arc::new(
            StageWorker::new(stage, stage_config.clone(), Arc::clone(&queue), handler)
                .with_audit(audit_handle.clone()),
        );
        worker.start().await;
        workers.push(worker);
    }
    info!("Started {} stage workers", workers.len());

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        audit_handle.clone(),
        audit_store,
        queue,
        dedup_records,
        workers.clone(),
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

    // Stop workers so in-flight leases are abandoned cleanly
    info!("Server shutting down...");
    for worker in &workers {
        worker.stop().await;
    }

    // Emit ServiceStopped event
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // Drop all holders of AuditHandle so the writer's channel closes.
    // The workers hold clones, so they must go first. Order matters: the
    // final event is emitted BEFORE dropping handles.
    drop(workers);
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
