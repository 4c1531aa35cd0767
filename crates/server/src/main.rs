use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doctr_core::{
    load_config, validate_config, AzureTranslatorClient, FsObjectStorage, ObjectStorage,
    StorageBackend, TranslationEngine,
};
use doctr_server::api::create_router;
use doctr_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
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

    info!("doctr {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var("DOCTR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("doctr.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Engine endpoint: {}", config.engine.endpoint);

    // Create object storage
    let storage: Arc<dyn ObjectStorage> = match config.storage.backend {
        StorageBackend::Filesystem => {
            info!(
                "Initializing filesystem storage at {:?}",
                config.storage.root
            );
            Arc::new(FsObjectStorage::new(
                config.storage.root.clone(),
                config.storage.signing_key.clone(),
            ))
        }
    };

    // Create translation engine client
    let engine: Arc<dyn TranslationEngine> = Arc::new(
        AzureTranslatorClient::new(&config.engine)
            .context("Failed to create translation engine client")?,
    );

    // Create app state
    let state = Arc::new(
        AppState::new(config.clone(), engine, storage)
            .context("Failed to create run orchestrator")?,
    );

    // Create router
    let app = create_router(Arc::clone(&state));

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

    // Runs still in progress get cancelled so their containers are cleaned up
    let remaining = state.active_runs().await;
    for run_id in &remaining {
        state.cancel_run(run_id).await;
    }
    if !remaining.is_empty() {
        info!("Cancelled {} run(s) still in progress", remaining.len());
    }

    info!("Server shutting down...");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
