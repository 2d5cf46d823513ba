//! User and pet models for storage.

use serde::{Deserialize, Serialize};

/// Subscription plan, which caps how many devices and schedules a user may own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl Plan {
    /// Maximum number of devices linked to one account.
    pub fn device_limit(self) -> usize {
        match self {
            Plan::Free => 1,
            Plan::Basic => 3,
            Plan::Premium => 10,
            Plan::Enterprise => 999,
        }
    }

    /// Maximum number of schedules across all of an account's devices.
    pub fn schedule_limit(self) -> usize {
        match self {
            Plan::Free => 3,
            Plan::Basic => 10,
            Plan::Premium => 50,
            Plan::Enterprise => 999,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Premium => "premium",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Parse a stored plan name. Unknown names fall back to `Free`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "basic" => Plan::Basic,
            "premium" => Plan::Premium,
            "enterprise" => Plan::Enterprise,
            _ => Plan::Free,
        }
    }
}

/// Account owning devices, pets and schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Numeric user ID (also the JWT subject)
    pub id: u64,
    /// Email address, matched case-insensitively during device registration
    pub email: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub plan: Plan,
}

/// A pet belonging to a user, optionally configured on one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pet {
    pub id: u64,
    pub owner_id: u64,
    /// Device the pet is fed from, if any
    #[serde(default)]
    pub device_id: Option<String>,
    pub name: String,
}
