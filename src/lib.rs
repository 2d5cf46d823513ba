// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Feeder-Sync: device synchronization and command dispatch for pet feeders
//!
//! This crate provides the backend API that polling feeders talk to:
//! presence tracking, per-device command queues, schedule plans and
//! food-level alerts.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::Db;
use services::{AlertEngine, CommandQueue, DeviceGateway, NotificationSink, PresenceTracker};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub presence: Arc<PresenceTracker>,
    pub queue: Arc<CommandQueue>,
    pub alerts: Arc<AlertEngine>,
    pub gateway: DeviceGateway,
}

impl AppState {
    /// Wire the per-device stores and the gateway around `db`.
    pub fn new(config: Config, db: Db, notifier: Arc<dyn NotificationSink>) -> Self {
        let presence = Arc::new(PresenceTracker::new(config.offline_timeout));
        let queue = Arc::new(CommandQueue::new(config.command_queue_capacity));
        let alerts = Arc::new(AlertEngine::new());
        let gateway = DeviceGateway::new(
            db.clone(),
            presence.clone(),
            queue.clone(),
            alerts.clone(),
            notifier,
        );

        Self {
            config,
            db,
            presence,
            queue,
            alerts,
            gateway,
        }
    }
}
