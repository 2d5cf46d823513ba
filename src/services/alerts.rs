// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Food-level alerting with hysteresis.
//!
//! Readings fall into three bands: above 50% (ok), 11-50% (warning) and
//! 0-10% (critical). An alert fires only when a reading lands in a band worse
//! than the last one alerted for the device. The alerted band is cleared only
//! by a refill above 50%, so a level jittering across a threshold alerts once.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::alert::{CRITICAL_THRESHOLD, WARNING_THRESHOLD};
use crate::models::{AlertEvent, AlertSeverity, FoodAlertState};

/// Alert band of a level, `None` when above the warning threshold.
pub fn band(level: u8) -> Option<AlertSeverity> {
    if level <= CRITICAL_THRESHOLD {
        Some(AlertSeverity::Critical)
    } else if level <= WARNING_THRESHOLD {
        Some(AlertSeverity::Warning)
    } else {
        None
    }
}

/// Severity to emit for a reading in `current` band, given the last alerted.
pub fn escalation(
    last_alerted: Option<AlertSeverity>,
    current: Option<AlertSeverity>,
) -> Option<AlertSeverity> {
    match (last_alerted, current) {
        (_, None) => None,
        (None, current) => current,
        (Some(last), Some(current)) => (current > last).then_some(current),
    }
}

/// Per-device alert state, keyed by device ID.
#[derive(Default)]
pub struct AlertEngine {
    states: DashMap<String, FoodAlertState>,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a reading and return the alert it triggers, if any.
    ///
    /// A device with no previous reading is treated as full, so a first
    /// reading that is already low alerts.
    pub fn evaluate(&self, device_id: &str, level_percent: u8) -> Option<AlertEvent> {
        self.evaluate_at(device_id, level_percent, Utc::now())
    }

    pub fn evaluate_at(
        &self,
        device_id: &str,
        level_percent: u8,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        let current = level_percent.min(100);

        let mut state = self
            .states
            .entry(device_id.to_string())
            .or_insert_with(|| FoodAlertState {
                last_level: 100,
                last_alert: None,
                updated_at: now,
            });

        let current_band = band(current);
        state.last_level = current;
        state.updated_at = now;

        if current_band.is_none() {
            // Refilled
            state.last_alert = None;
        }

        let severity = escalation(state.last_alert.map(|(s, _)| s), current_band)?;
        state.last_alert = Some((severity, now));
        drop(state);

        tracing::info!(device_id, ?severity, level = current, "Food level alert");
        Some(AlertEvent {
            device_id: device_id.to_string(),
            severity,
            level_percent: current,
            at: now,
        })
    }

    pub fn state(&self, device_id: &str) -> Option<FoodAlertState> {
        self.states.get(device_id).map(|s| s.clone())
    }

    pub fn reset(&self, device_id: &str) {
        self.states.remove(device_id);
    }

    /// Drop state not updated within `max_idle`. Returns how many were removed.
    pub fn evict_inactive(&self, max_idle: std::time::Duration) -> usize {
        let max_idle = Duration::from_std(max_idle).unwrap_or(Duration::MAX);
        let now = Utc::now();
        let before = self.states.len();
        self.states.retain(|_, s| now - s.updated_at < max_idle);
        before.saturating_sub(self.states.len())
    }
}
