// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - device sync and dispatch logic.

pub mod alerts;
pub mod command_queue;
pub mod device_auth;
pub mod gateway;
pub mod notifier;
pub mod presence;
pub mod schedule_sync;

pub use alerts::AlertEngine;
pub use command_queue::CommandQueue;
pub use gateway::DeviceGateway;
pub use notifier::{BroadcastNotifier, Notification, NotificationSink};
pub use presence::PresenceTracker;
pub use schedule_sync::{ScheduleInput, ScheduleSync};
