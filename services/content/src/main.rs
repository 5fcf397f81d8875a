use anyhow::{Context, Result};
use shrine_content::api::{create_router, start_api_server, AppState, CatalogState, DocumentState};
use shrine_content::config::{Backend, Config};
use shrine_content::{BlobStore, Catalog, DocumentStore, MetadataStore, Projector, Reconciler};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        backend = ?config.service.backend,
        "Starting shrine content service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let state = match config.service.backend {
        Backend::Relational => AppState::Catalog(build_catalog(&config).await?),
        Backend::Document => AppState::Document(DocumentState {
            document: Arc::new(
                DocumentStore::new(&config.document)
                    .await
                    .context("Failed to initialize document store")?,
            ),
        }),
    };

    let router = create_router(state, &config.api, &config.blobs);

    start_api_server(router, &config.api, shutdown_signal()).await?;

    info!("Content service stopped");

    Ok(())
}

/// Wire the metadata store, blob store and the operations over them
async fn build_catalog(config: &Config) -> Result<CatalogState> {
    let metadata = Arc::new(
        MetadataStore::new(&config.database)
            .await
            .context("Failed to initialize metadata store")?,
    );

    // Run migrations if enabled
    if config.database.run_migrations {
        metadata
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let blobs = Arc::new(
        BlobStore::new(&config.blobs)
            .await
            .context("Failed to initialize blob store")?,
    );

    let projector = Projector::new(&config.blobs.serve_prefix);

    Ok(CatalogState {
        catalog: Arc::new(Catalog::new(metadata.clone(), blobs.clone(), projector)),
        reconciler: Arc::new(Reconciler::new(metadata, blobs)),
    })
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
