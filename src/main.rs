mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod storage;

#[cfg(test)]
mod test_support;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, FeedConfig};
use crate::db::Database;
use crate::services::{
    spawn_periodic, CandidateQueue, FeedPoller, ImagePipeline, ImageService, PostProcessor,
    SafetyFilter, Schedule, WorkerPool,
};
use crate::storage::{BlobStore, LocalBlobStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub blobs: Arc<dyn BlobStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "birbhoard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting birbhoard...");

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    // Initialize storage and database
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.storage.blob_path));
    let db = Database::new(&config.database.path).await?;
    db.run_migrations(blobs.as_ref()).await?;
    let servable = ImageService::count_servable(&db).await?;
    tracing::info!(
        "Database initialized, {} servable images ({} blobs)",
        servable,
        blobs.storage_type()
    );

    let client = build_http_client(&config.feed)?;
    let queue = Arc::new(CandidateQueue::new(config.queue.max_len, config.queue.overflow));
    let workers = WorkerPool::new(config.workers.threads);
    match workers.limit() {
        Some(limit) => tracing::info!("Image workers limited to {}", limit),
        None => tracing::info!("Image workers unbounded"),
    }

    let poller = Arc::new(FeedPoller::new(
        client.clone(),
        config.feed.api_base.clone(),
        config.feed.subreddits.clone(),
        config.feed.listing_types.clone(),
        queue.clone(),
    ));
    let processor = Arc::new(PostProcessor::new(
        queue,
        SafetyFilter::new(config.feed.media_host_prefix.clone()),
        ImagePipeline::new(
            client,
            db.clone(),
            blobs.clone(),
            workers,
            config.feed.max_image_bytes,
        ),
    ));

    // Background tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let fetch_task = spawn_periodic(
        "feed poller",
        Schedule::new(config.schedule.fetch_delay(), config.schedule.fetch_interval()),
        shutdown_rx.clone(),
        move || {
            let poller = poller.clone();
            async move {
                poller.poll_once().await;
            }
        },
    );
    let process_task = spawn_periodic(
        "post processor",
        Schedule::new(config.schedule.process_delay(), config.schedule.process_interval()),
        shutdown_rx,
        move || {
            // Dropping the report detaches the dispatched jobs.
            processor.run_once();
            std::future::ready(())
        },
    );

    // Build router
    let app = create_router(AppState { db, blobs });

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down background tasks...");
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(fetch_task, process_task);

    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::image::random_image))
        .route("/id/:id", get(handlers::image::get_image))
        .route("/info/id/:id", get(handlers::image::get_image_info))
        .fallback(handlers::image::random_image)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_http_client(feed: &FeedConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(feed.user_agent.clone())
        .connect_timeout(Duration::from_secs(feed.connect_timeout_secs))
        .build()?;
    Ok(client)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
