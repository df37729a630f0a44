//! vestige-api - HTTP API server for vestige

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vestige_api::config::ServerConfig;
use vestige_api::{router, with_http_layers, AppState};
use vestige_core::{ImageDirectory, JobStore, NotificationBus, RelationshipStore};
use vestige_db::{Database, PoolConfig, Retrying};
use vestige_graph::RelationshipGraphEngine;
use vestige_jobs::{spawn_retention_sweeper, RedisEventListener, SweeperConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "vestige=info,tower_http=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "vestige_api=info,vestige_core=info,vestige_db=info,vestige_graph=info,vestige_jobs=info,tower_http=info"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("vestige-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env();

    // Connect to database
    info!(subsystem = "api", "Connecting to database...");
    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    info!(subsystem = "api", "Database connected");

    info!(subsystem = "api", "Running database migrations...");
    db.migrate().await?;
    info!(subsystem = "api", "Database migrations complete");

    let jobs: Arc<dyn JobStore> = Arc::new(Retrying::new(db.jobs.clone()));
    let relationships: Arc<dyn RelationshipStore> =
        Arc::new(Retrying::new(db.relationships.clone()));
    let images: Arc<dyn ImageDirectory> = Arc::new(db.images.clone());

    // Producers in worker processes publish through Redis when enabled; the
    // listener feeds those events into this process's bus.
    let bus = NotificationBus::new(config.event_buffer_capacity);
    let relay_listener = if config.redis_enabled {
        match RedisEventListener::open(&config.redis_url) {
            Ok(listener) => Some(listener.listen(bus.clone())),
            Err(e) => {
                warn!(
                    subsystem = "api",
                    error = %e,
                    "Invalid REDIS_URL, job streams only see in-process events"
                );
                None
            }
        }
    } else {
        info!(subsystem = "api", "Redis relay disabled via REDIS_ENABLED=false");
        None
    };

    let sweeper = spawn_retention_sweeper(jobs.clone(), SweeperConfig::from_env());

    let graph = RelationshipGraphEngine::new(relationships, images.clone());
    let state = AppState::new(jobs, images, graph, bus)
        .with_stream_keepalive(config.stream_keepalive);
    let app = with_http_layers(router(state), &config.allowed_origins);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!(subsystem = "api", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(listener) = relay_listener {
        listener.abort();
    }
    sweeper.shutdown().await?;
    info!(subsystem = "api", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(subsystem = "api", error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(subsystem = "api", "Shutdown signal received");
}
