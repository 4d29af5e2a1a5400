//! FlowGuard API Server
//!
//! Capture upload gateway and alert query API in front of the FlowGuard
//! pipeline. Uploads and the directory watcher both feed the same dispatcher.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      FLOWGUARD SERVER                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌────────────┐                             │
//! │  │  Upload    │   │ Directory  │                             │
//! │  │  (Axum)    │   │  Watcher   │                             │
//! │  └─────┬──────┘   └─────┬──────┘                             │
//! │        └────────┬───────┘                                    │
//! │                 ▼                                            │
//! │          ┌────────────┐     ┌──────────────────────────────┐ │
//! │          │ Dispatcher │ ──► │ extract → classify → alerts  │ │
//! │          └────────────┘     └──────────────┬───────────────┘ │
//! │                                            ▼                 │
//! │          GET /alerts ◄─────────────  alerts.jsonl            │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod models;
mod handlers;
mod error;


use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowguard_core::{AlertStore, DirectoryWatcher, Dispatcher, Pipeline};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize logging (core crate logs through `log`, bridged here)
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "flowguard_server=debug,flowguard_core=info,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env();

    tracing::info!("FlowGuard server v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::info!("Extractor image: {}", config.pipeline.extractor_image);
    tracing::info!("Alert log: {}", config.pipeline.alerts_file.display());

    std::fs::create_dir_all(&config.pipeline.input_dir)?;
    std::fs::create_dir_all(&config.pipeline.output_dir)?;

    // Build pipeline and workers
    let pipeline_config = Arc::new(config.pipeline.clone());
    let store = Arc::new(AlertStore::new(pipeline_config.alerts_file.clone()));
    let pipeline = Arc::new(Pipeline::from_config(pipeline_config.clone(), store.clone()));
    let dispatcher = Dispatcher::start(pipeline, pipeline_config.workers);

    // Directory trigger
    let watcher = if pipeline_config.watch_enabled {
        Some(DirectoryWatcher::start(
            &pipeline_config.watch_dir,
            &pipeline_config.capture_extension,
            dispatcher.clone(),
            pipeline_config.settle_delay,
        )?)
    } else {
        tracing::info!("Directory watcher disabled");
        None
    };

    // Build application state
    let state = AppState {
        dispatcher: dispatcher.clone(),
        store,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    dispatcher.shutdown().await;
    tracing::info!("FlowGuard server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<AlertStore>,
    pub config: Arc<config::Config>,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health::check))

        // Capture ingress
        .route(
            "/upload",
            post(handlers::upload::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )

        // Alerts
        .route("/alerts", get(handlers::alerts::list))

        // Jobs
        .route("/jobs", get(handlers::jobs::list))
        .route("/jobs/:key", get(handlers::jobs::get))

        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
