//! ==============================================================================
//! main.rs - sensor relay entry point
//! ==============================================================================
//!
//! purpose:
//!     the backend of the telemetry dashboard. it pulls readings from the
//!     remote sensor endpoints, keeps the last hour of them, and relays them
//!     live to every connected browser.
//!
//! responsibilities:
//!     - load relay.toml (or defaults) and start structured logging
//!     - build the shared handles: store, fetcher, live relay
//!     - run the retention sweeper in the background
//!     - serve the REST api and the websocket feed until ctrl-c
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                     sensor relay (this file)                 │
//!     │  ┌──────────────┐  ┌────────────────┐  ┌──────────────────┐  │
//!     │  │ rest api     │  │ live sessions  │  │ retention sweep  │  │
//!     │  │ (port 3100)  │  │ (3s per socket)│  │ (60s cycle)      │  │
//!     │  └──────┬───────┘  └───────┬────────┘  └────────┬─────────┘  │
//!     │         │                  │                    │            │
//!     │         └──────────────────┼────────────────────┘            │
//!     │                            │                                 │
//!     │                     ┌──────┴──────┐                          │
//!     │                     │ memory store│ <- store.rs              │
//!     │                     └─────────────┘                          │
//!     └────────────────────────────┬─────────────────────────────────┘
//!                                  │ http GET
//!                      ┌───────────┴───────────┐
//!                      ▼                       ▼
//!               ┌─────────────┐         ┌─────────────┐
//!               │ dht sensor  │         │ ds18b20     │
//!               │ (kitchen)   │         │ (living rm) │
//!               └─────────────┘         └─────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use sensor_relay::{
    clock::SystemClock,
    config::Settings,
    fetcher::{HttpFetcher, RemoteSensors},
    relay::LiveRelay,
    server::{self, AppState},
    store::{MemoryStore, ReadingStore},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    let (config, source) = Settings::load_or_default();

    // step 2: logging; RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    config.log_summary(&source);

    // step 3: shared handles
    let store: Arc<dyn ReadingStore> = Arc::new(MemoryStore::new(
        config.retention.window(),
        Arc::new(SystemClock),
    ));
    let fetcher = HttpFetcher::new(&config.fetch).context("failed to build http client")?;
    let sensors = RemoteSensors::new(
        Arc::new(fetcher),
        config.devices.primary.clone(),
        config.devices.secondary.clone(),
    );
    let relay = LiveRelay::new(sensors.clone(), store.clone(), config.relay.interval())
        .with_sensor_logging(config.logging.show_sensor_data);

    // step 4: retention sweeper
    tokio::spawn(sweep_expired(
        store.clone(),
        Duration::from_secs(config.retention.sweep_seconds.max(1)),
    ));

    // step 5: serve
    let state = AppState {
        store,
        sensors,
        relay,
        devices: config.devices.clone(),
        api_token: config.auth.bearer_token.as_deref().map(Arc::from),
    };
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("relay stopped");
    Ok(())
}

/// drops expired readings for good; reads already hide them
async fn sweep_expired(store: Arc<dyn ReadingStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match store.purge_expired().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "expired readings purged"),
            Err(e) => tracing::warn!(error = %e, "retention sweep failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
