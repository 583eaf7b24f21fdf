//! Kerbside Server - parking bay proximity and occupancy service

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kerbside_core::BoundaryMatcher;
use kerbside_feed::{
    BaySource, BoundarySource, GeoJsonBoundaries, JsonFileSource, MelbourneClient, StaticBoundaries,
};
use kerbside_server::{api, config::Config, loops, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("kerbside_server=debug".parse()?))
        .init();

    tracing::info!("Starting Kerbside Server...");

    let config = Config::from_env();
    let port = config.server_port;

    let source: Arc<dyn BaySource> = match &config.records_file {
        Some(path) => {
            tracing::info!("Reading bay records from {}", path.display());
            Arc::new(JsonFileSource::new(path))
        }
        None => {
            tracing::info!("Fetching bay records from {}", config.feed_url);
            Arc::new(
                MelbourneClient::new(&config.feed_url, config.feed_page_size, config.feed_max_records)
                    .context("Failed to create feed client")?,
            )
        }
    };

    let boundary_source: Box<dyn BoundarySource> = match &config.boundaries_file {
        Some(path) => Box::new(GeoJsonBoundaries::new(path)),
        None => {
            tracing::warn!("KERBSIDE_BOUNDARIES_FILE not set; bays will not be matched to suburbs");
            Box::new(StaticBoundaries::default())
        }
    };
    let boundaries = match boundary_source.load().await {
        Ok(boundaries) => boundaries,
        Err(err) => {
            tracing::warn!(
                "Failed to load boundaries from {}: {}; continuing without suburbs",
                boundary_source.name(),
                err
            );
            Vec::new()
        }
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        source,
        BoundaryMatcher::new(boundaries),
    ));

    // Start background refresh
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let refresh_handle = tokio::spawn(loops::refresh_loop::run_refresh_loop(
        state.refresh().clone(),
        config.refresh_interval(),
        shutdown_tx.subscribe(),
    ));

    // Build the app
    let app = api::routes()
        .with_state(state)
        .layer(CorsLayer::permissive());

    // Run server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    if let Err(err) = refresh_handle.await {
        tracing::warn!("Refresh loop ended abnormally: {}", err);
    }
    tracing::info!("Kerbside Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
