// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device presence tracking.
//!
//! Online state is derived on read from the last-contact timestamp; nothing
//! sweeps records to flip them offline. Every device request counts as
//! contact, whether or not it carried telemetry.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::{PresenceRecord, Telemetry};

struct PresenceEntry {
    record: PresenceRecord,
    /// Last state surfaced to the owner, so a transition is reported once.
    reported_online: bool,
}

impl PresenceEntry {
    fn is_online_at(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.record.last_contact < timeout
    }
}

/// Last-contact table keyed by device ID.
///
/// Each device's entry is mutated under its `DashMap` shard lock, so contacts
/// from different devices never serialize on one another.
pub struct PresenceTracker {
    entries: DashMap<String, PresenceEntry>,
    timeout: Duration,
}

impl PresenceTracker {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            entries: DashMap::new(),
            timeout: Duration::from_std(timeout).unwrap_or(Duration::MAX),
        }
    }

    /// Record a contact now. Returns true if the device was offline (or never
    /// seen) before this contact.
    pub fn record_contact(&self, device_id: &str, telemetry: Telemetry) -> bool {
        self.record_contact_at(device_id, telemetry, Utc::now())
    }

    pub fn record_contact_at(
        &self,
        device_id: &str,
        telemetry: Telemetry,
        now: DateTime<Utc>,
    ) -> bool {
        let timeout = self.timeout;
        let mut came_online = false;

        self.entries
            .entry(device_id.to_string())
            .and_modify(|entry| {
                came_online = !entry.is_online_at(now, timeout);
                entry.record.last_contact = now;
                entry.record.telemetry.merge(telemetry.clone());
                entry.reported_online = true;
            })
            .or_insert_with(|| {
                came_online = true;
                PresenceEntry {
                    record: PresenceRecord {
                        device_id: device_id.to_string(),
                        last_contact: now,
                        telemetry: telemetry.clone(),
                    },
                    reported_online: true,
                }
            });

        if came_online {
            tracing::debug!(device_id, "Device came online");
        }
        came_online
    }

    /// False for devices that never made contact.
    pub fn is_online(&self, device_id: &str) -> bool {
        self.is_online_at(device_id, Utc::now())
    }

    pub fn is_online_at(&self, device_id: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(device_id)
            .is_some_and(|entry| entry.is_online_at(now, self.timeout))
    }

    /// Number of devices currently online.
    pub fn online_count(&self) -> usize {
        self.online_count_at(Utc::now())
    }

    pub fn online_count_at(&self, now: DateTime<Utc>) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.is_online_at(now, self.timeout))
            .count()
    }

    pub fn snapshot(&self, device_id: &str) -> Option<PresenceRecord> {
        self.entries.get(device_id).map(|entry| entry.record.clone())
    }

    /// Check whether the device has gone offline since it was last reported
    /// online. Returns true exactly once per online→offline transition.
    pub fn observe(&self, device_id: &str) -> bool {
        self.observe_at(device_id, Utc::now())
    }

    pub fn observe_at(&self, device_id: &str, now: DateTime<Utc>) -> bool {
        let Some(mut entry) = self.entries.get_mut(device_id) else {
            return false;
        };

        if entry.reported_online && !entry.is_online_at(now, self.timeout) {
            entry.reported_online = false;
            true
        } else {
            false
        }
    }

    /// Forget a device entirely (used when it re-registers).
    pub fn reset(&self, device_id: &str) {
        self.entries.remove(device_id);
    }

    /// Drop records idle for at least `max_idle`. Returns how many were removed.
    pub fn evict_inactive(&self, max_idle: std::time::Duration) -> usize {
        self.evict_inactive_at(max_idle, Utc::now())
    }

    pub fn evict_inactive_at(&self, max_idle: std::time::Duration, now: DateTime<Utc>) -> usize {
        let max_idle = Duration::from_std(max_idle).unwrap_or(Duration::MAX);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.record.last_contact < max_idle);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(600);

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_never_seen_device_is_offline() {
        let tracker = PresenceTracker::new(TIMEOUT);
        assert!(!tracker.is_online("ghost"));
        assert!(tracker.snapshot("ghost").is_none());
        assert!(!tracker.observe("ghost"));
    }

    #[test]
    fn test_offline_exactly_at_timeout() {
        let tracker = PresenceTracker::new(TIMEOUT);
        tracker.record_contact_at("dev", Telemetry::default(), t0());

        let just_before = t0() + Duration::seconds(599);
        let at_timeout = t0() + Duration::seconds(600);
        assert!(tracker.is_online_at("dev", just_before));
        assert!(!tracker.is_online_at("dev", at_timeout));
    }

    #[test]
    fn test_online_count() {
        let tracker = PresenceTracker::new(TIMEOUT);
        tracker.record_contact_at("old", Telemetry::default(), t0());
        tracker.record_contact_at("new", Telemetry::default(), t0() + Duration::seconds(500));

        assert_eq!(tracker.online_count_at(t0() + Duration::seconds(300)), 2);
        assert_eq!(tracker.online_count_at(t0() + Duration::seconds(700)), 1);
        assert_eq!(tracker.online_count_at(t0() + Duration::seconds(1200)), 0);
    }

    #[test]
    fn test_contact_reports_transition() {
        let tracker = PresenceTracker::new(TIMEOUT);

        assert!(tracker.record_contact_at("dev", Telemetry::default(), t0()));
        assert!(!tracker.record_contact_at(
            "dev",
            Telemetry::default(),
            t0() + Duration::seconds(60)
        ));

        // Silent past the window, then back
        let later = t0() + Duration::seconds(60 + 600);
        assert!(!tracker.is_online_at("dev", later));
        assert!(tracker.record_contact_at("dev", Telemetry::default(), later));
        assert!(tracker.is_online_at("dev", later));
    }

    #[test]
    fn test_contact_merges_telemetry() {
        let tracker = PresenceTracker::new(TIMEOUT);
        tracker.record_contact_at(
            "dev",
            Telemetry {
                food_level_percent: Some(80),
                signal_strength: Some(-55),
                ..Default::default()
            },
            t0(),
        );
        // A poll carries no telemetry
        tracker.record_contact_at("dev", Telemetry::default(), t0() + Duration::seconds(5));

        let snap = tracker.snapshot("dev").unwrap();
        assert_eq!(snap.last_contact, t0() + Duration::seconds(5));
        assert_eq!(snap.telemetry.food_level_percent, Some(80));
        assert_eq!(snap.telemetry.signal_strength, Some(-55));
    }

    #[test]
    fn test_observe_reports_offline_once() {
        let tracker = PresenceTracker::new(TIMEOUT);
        tracker.record_contact_at("dev", Telemetry::default(), t0());

        assert!(!tracker.observe_at("dev", t0() + Duration::seconds(10)));
        let stale = t0() + Duration::seconds(700);
        assert!(tracker.observe_at("dev", stale));
        assert!(!tracker.observe_at("dev", stale + Duration::seconds(1)));

        tracker.record_contact_at("dev", Telemetry::default(), stale + Duration::seconds(2));
        assert!(tracker.observe_at("dev", stale + Duration::seconds(2000)));
    }

    #[test]
    fn test_evict_inactive() {
        let tracker = PresenceTracker::new(TIMEOUT);
        tracker.record_contact_at("old", Telemetry::default(), t0());
        tracker.record_contact_at("new", Telemetry::default(), t0() + Duration::days(6));

        let removed = tracker.evict_inactive_at(
            std::time::Duration::from_secs(7 * 24 * 3600),
            t0() + Duration::days(8),
        );
        assert_eq!(removed, 1);
        assert!(tracker.snapshot("old").is_none());
        assert!(tracker.snapshot("new").is_some());
    }
}
