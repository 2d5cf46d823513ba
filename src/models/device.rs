// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device identity and presence models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered feeder.
///
/// The device ID is chosen by the firmware (usually derived from the MAC) and
/// is globally unique. Ownership is cleared when a user unlinks the device,
/// but the row is kept so that a later registration can reclaim it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    /// Owning user, `None` after unlink
    pub owner_id: Option<u64>,
    pub name: String,
    /// SHA-256 hex digest of the auth token handed out at registration
    pub auth_token_hash: String,
    pub firmware_version: Option<String>,
    pub mac: Option<String>,
    pub ip: Option<String>,
    /// Whether the device should run in power-save mode
    #[serde(default)]
    pub power_save: bool,
    pub registered_at: DateTime<Utc>,
}

impl Device {
    /// Default display name for a freshly registered device.
    pub fn default_name(device_id: &str) -> String {
        let chars: Vec<char> = device_id.chars().collect();
        let start = chars.len().saturating_sub(6);
        let suffix: String = chars[start..].iter().collect();
        format!("PetFeeder {}", suffix)
    }

    /// True if `user_id` currently owns this device.
    pub fn is_owned_by(&self, user_id: u64) -> bool {
        self.owner_id == Some(user_id)
    }
}

/// Telemetry carried by a device contact. Every field is optional because
/// polls carry none of it and older firmware omits some of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_level_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Firmware-reported operating mode ("normal", "power_save", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedules_count: Option<u32>,
}

impl Telemetry {
    /// Overlay `newer` onto `self`, keeping old values for fields `newer` omits.
    pub fn merge(&mut self, newer: Telemetry) {
        if newer.food_level_percent.is_some() {
            self.food_level_percent = newer.food_level_percent;
        }
        if newer.signal_strength.is_some() {
            self.signal_strength = newer.signal_strength;
        }
        if newer.ip.is_some() {
            self.ip = newer.ip;
        }
        if newer.mode.is_some() {
            self.mode = newer.mode;
        }
        if newer.schedules_count.is_some() {
            self.schedules_count = newer.schedules_count;
        }
    }
}

/// Clamp a reported food level to a whole percentage in `0..=100`.
pub fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        0
    } else {
        raw.round().clamp(0.0, 100.0) as u8
    }
}

/// Last-contact record for one device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub device_id: String,
    pub last_contact: DateTime<Utc>,
    pub telemetry: Telemetry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_uses_last_six_chars() {
        assert_eq!(Device::default_name("ESP32_A1B2C3D4"), "PetFeeder B2C3D4");
        assert_eq!(Device::default_name("abc"), "PetFeeder abc");
    }

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(42.4), 42);
        assert_eq!(clamp_percent(-3.0), 0);
        assert_eq!(clamp_percent(180.0), 100);
        assert_eq!(clamp_percent(f64::NAN), 0);
    }

    #[test]
    fn test_telemetry_merge_keeps_missing_fields() {
        let mut current = Telemetry {
            food_level_percent: Some(70),
            signal_strength: Some(-60),
            mode: Some("normal".to_string()),
            ..Default::default()
        };
        current.merge(Telemetry {
            food_level_percent: Some(40),
            ..Default::default()
        });

        assert_eq!(current.food_level_percent, Some(40));
        assert_eq!(current.signal_strength, Some(-60));
        assert_eq!(current.mode.as_deref(), Some("normal"));
    }
}
