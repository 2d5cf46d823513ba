//! Food-level alert model.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Food-level band thresholds (inclusive upper bounds, percent).
pub const WARNING_THRESHOLD: u8 = 50;
pub const CRITICAL_THRESHOLD: u8 = 10;

/// Ordered by urgency: `Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Emitted when a reading lands in a band worse than the last one alerted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub device_id: String,
    pub severity: AlertSeverity,
    pub level_percent: u8,
    pub at: DateTime<Utc>,
}

/// Per-device alert bookkeeping.
#[derive(Debug, Clone)]
pub struct FoodAlertState {
    pub last_level: u8,
    pub last_alert: Option<(AlertSeverity, DateTime<Utc>)>,
    pub updated_at: DateTime<Utc>,
}
