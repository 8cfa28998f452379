mod challenges;
mod clock;
mod config;
mod db;
mod errors;
mod models;
mod progression;
mod routes;
mod state;
mod store;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::db::create_pool;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing or malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ascend API v{}", env!("CARGO_PKG_VERSION"));
    info!("Engine rules: {:?}", config.rules);

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.database_max_connections).await?;

    let state = AppState {
        store: Arc::new(PgStore::new(db)),
        clock: Arc::new(SystemClock),
        config: config.clone(),
    };

    if config.expiry_sweep_interval_secs > 0 {
        spawn_expiry_sweep(state.clone(), config.expiry_sweep_interval_secs);
    }

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS origins once the web client domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Fails overdue enrollments in the background so users who never call back are
/// still swept. Request handlers sweep on their own; this only shortens the lag.
fn spawn_expiry_sweep(state: AppState, every_secs: u64) {
    info!("Expiry sweep every {every_secs}s");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(every_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let swept =
                challenges::service::sweep_all(state.store.as_ref(), state.clock.as_ref()).await;
            if let Err(e) = swept {
                error!("Background expiry sweep failed: {e}");
            }
        }
    });
}
