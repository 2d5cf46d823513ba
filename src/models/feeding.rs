// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feeding history model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a history row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedingStatus {
    /// Recorded optimistically when a user queues a feed command
    Pending,
    /// Reported as executed by the device
    Success,
}

impl FeedingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedingStatus::Pending => "pending",
            FeedingStatus::Success => "success",
        }
    }

    /// Parse a stored status. Unknown values read as `Success`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => FeedingStatus::Pending,
            _ => FeedingStatus::Success,
        }
    }
}

/// One feeding event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedingRecord {
    pub id: u64,
    pub device_id: String,
    pub pet_id: u64,
    pub amount_grams: u32,
    /// "manual", "scheduled", "remote", or whatever the firmware reports
    pub trigger: String,
    pub status: FeedingStatus,
    pub timestamp: DateTime<Utc>,
}

/// Fields for inserting a new feeding record (ID and timestamp assigned by the store).
#[derive(Debug, Clone)]
pub struct NewFeeding {
    pub device_id: String,
    pub pet_id: u64,
    pub amount_grams: u32,
    pub trigger: String,
    pub status: FeedingStatus,
}
