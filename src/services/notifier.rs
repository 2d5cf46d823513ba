// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outbound notifications for device owners.
//!
//! The browser fan-out lives elsewhere; this module only defines the events
//! and the sink they are handed to.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{AlertEvent, FeedingRecord};

/// Event addressed to one device owner.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    DeviceOnline {
        device_id: String,
        at: DateTime<Utc>,
    },
    DeviceOffline {
        device_id: String,
        last_contact: DateTime<Utc>,
    },
    FoodAlert(AlertEvent),
    FeedingCompleted(FeedingRecord),
    FeedingRequested {
        device_id: String,
        pet_id: u64,
        amount_grams: u32,
    },
}

/// Destination for owner notifications. Delivery is best effort.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, user_id: u64, notification: Notification);
}

/// Notification addressed to a user, as seen by subscribers.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub user_id: u64,
    pub notification: Notification,
}

/// Sink backed by a `tokio` broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; with no subscribers,
/// events are dropped.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Envelope>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify(&self, user_id: u64, notification: Notification) {
        match self.sender.send(Envelope {
            user_id,
            notification,
        }) {
            Ok(receivers) => tracing::debug!(user_id, receivers, "Notification published"),
            Err(_) => tracing::debug!(user_id, "Notification dropped, no subscribers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_notification() {
        let notifier = BroadcastNotifier::new(16);
        let mut rx = notifier.subscribe();

        notifier.notify(
            7,
            Notification::DeviceOnline {
                device_id: "dev".to_string(),
                at: Utc::now(),
            },
        );

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.user_id, 7);
        assert!(matches!(
            envelope.notification,
            Notification::DeviceOnline { ref device_id, .. } if device_id == "dev"
        ));
    }

    #[test]
    fn test_notify_without_subscribers_is_harmless() {
        let notifier = BroadcastNotifier::new(16);
        notifier.notify(
            1,
            Notification::FeedingRequested {
                device_id: "dev".to_string(),
                pet_id: 2,
                amount_grams: 50,
            },
        );
    }

    #[test]
    fn test_notification_json_is_tagged() {
        let value = serde_json::to_value(Notification::FeedingRequested {
            device_id: "dev".to_string(),
            pet_id: 2,
            amount_grams: 50,
        })
        .unwrap();
        assert_eq!(value["type"], "feeding_requested");
        assert_eq!(value["pet_id"], 2);
    }
}
