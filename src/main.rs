// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feeder-Sync API Server
//!
//! Serves the polling endpoints used by pet feeders and the dashboard
//! endpoints that queue commands and edit schedules for them.

use feeder_sync::{
    config::Config,
    db::{Db, SeedData},
    services::BroadcastNotifier,
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often idle presence/alert state is swept.
const JANITOR_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Buffered notifications per subscriber before it starts lagging.
const NOTIFICATION_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Feeder-Sync API");

    let db = Db::connect(&config.database_url).await?;
    if let Some(path) = &config.seed_file {
        tracing::info!(path = %path, "Loading seed data");
        let (users, pets) = SeedData::from_file(path)?.apply(&db).await?;
        tracing::info!(users, pets, "Seed data loaded");
    }

    let notifier = Arc::new(BroadcastNotifier::new(NOTIFICATION_BUFFER));
    spawn_notification_log(&notifier);

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), db, notifier));
    spawn_janitor(state.clone());

    // Build router
    let app = feeder_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feeder_sync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

/// Periodically evict per-device state for devices that stopped talking.
fn spawn_janitor(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (presence, alerts) = state.gateway.evict_idle(state.config.presence_evict_after);
            if presence + alerts > 0 {
                tracing::info!(presence, alerts, "Evicted idle device state");
            }
        }
    });
}

/// Log every owner notification until a real fan-out subscribes.
fn spawn_notification_log(notifier: &BroadcastNotifier) {
    let mut rx = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => match serde_json::to_string(&envelope.notification) {
                    Ok(json) => {
                        tracing::info!(user_id = envelope.user_id, notification = %json, "Owner notification")
                    }
                    Err(e) => tracing::warn!(error = %e, "Unserializable notification"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification log lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
