// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Schedule definitions (user-authored) and the compiled execution plan
//! (device-consumed).

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Per-weekday enable flags of a schedule definition.
///
/// Missing flags deserialize as `true`, so a request that omits `weekdays`
/// entirely means "every day".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weekdays {
    #[serde(default = "enabled")]
    pub sunday: bool,
    #[serde(default = "enabled")]
    pub monday: bool,
    #[serde(default = "enabled")]
    pub tuesday: bool,
    #[serde(default = "enabled")]
    pub wednesday: bool,
    #[serde(default = "enabled")]
    pub thursday: bool,
    #[serde(default = "enabled")]
    pub friday: bool,
    #[serde(default = "enabled")]
    pub saturday: bool,
}

fn enabled() -> bool {
    true
}

impl Default for Weekdays {
    fn default() -> Self {
        Self::every_day()
    }
}

impl Weekdays {
    pub fn every_day() -> Self {
        Self::from_flags([true; 7])
    }

    /// Build from flags indexed 0=Sunday..6=Saturday.
    pub fn from_flags(flags: [bool; 7]) -> Self {
        let [sunday, monday, tuesday, wednesday, thursday, friday, saturday] = flags;
        Self {
            sunday,
            monday,
            tuesday,
            wednesday,
            thursday,
            friday,
            saturday,
        }
    }

    /// Flags indexed 0=Sunday..6=Saturday.
    pub fn flags(&self) -> [bool; 7] {
        [
            self.sunday,
            self.monday,
            self.tuesday,
            self.wednesday,
            self.thursday,
            self.friday,
            self.saturday,
        ]
    }

    /// Bitmask with bit `i` set for weekday index `i` (0=Sunday).
    pub fn to_bits(&self) -> u8 {
        self.flags()
            .iter()
            .enumerate()
            .fold(0, |bits, (i, on)| if *on { bits | (1 << i) } else { bits })
    }

    pub fn from_bits(bits: u8) -> Self {
        let mut flags = [false; 7];
        for (i, flag) in flags.iter_mut().enumerate() {
            *flag = bits & (1 << i) != 0;
        }
        Self::from_flags(flags)
    }

    /// Weekday indices as the firmware expects them. No flags set means every
    /// day, never "never".
    pub fn to_day_indices(&self) -> Vec<u8> {
        let days: Vec<u8> = self
            .flags()
            .iter()
            .enumerate()
            .filter(|(_, on)| **on)
            .map(|(i, _)| i as u8)
            .collect();

        if days.is_empty() {
            (0..7).collect()
        } else {
            days
        }
    }
}

/// A user-authored feeding rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: u64,
    pub owner_id: u64,
    pub pet_id: u64,
    pub device_id: String,
    pub hour: u8,
    pub minute: u8,
    /// Portion in grams
    pub amount_grams: u32,
    pub weekdays: Weekdays,
    pub active: bool,
}

/// Discrete portion size understood by the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[serde(rename_all = "lowercase")]
pub enum PortionSize {
    Small,
    Medium,
    Large,
}

impl PortionSize {
    /// Classify grams: `<=50` small, `51..=100` medium, `>100` large. The
    /// firmware dispenses by class, so these breakpoints must not move.
    pub fn from_grams(grams: u32) -> Self {
        if grams <= 50 {
            PortionSize::Small
        } else if grams <= 100 {
            PortionSize::Medium
        } else {
            PortionSize::Large
        }
    }

    /// Nominal grams recorded in history when a device reports a size class.
    pub fn nominal_grams(self) -> u32 {
        match self {
            PortionSize::Small => 50,
            PortionSize::Medium => 100,
            PortionSize::Large => 150,
        }
    }

    /// Lenient parse of a firmware-reported size; unknown values are `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "small" => Some(PortionSize::Small),
            "medium" => Some(PortionSize::Medium),
            "large" => Some(PortionSize::Large),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortionSize::Small => "small",
            PortionSize::Medium => "medium",
            PortionSize::Large => "large",
        }
    }
}

/// One entry of the compiled plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PlanEntry {
    pub hour: u8,
    pub minute: u8,
    pub size: PortionSize,
    pub days: Vec<u8>,
    /// Pet name, shown on the device display
    pub label: String,
}

/// Ordered plan served to a device. The firmware tracks "already fired today"
/// by position in `entries`, so ordering must be stable across syncs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleExecutionPlan {
    pub entries: Vec<PlanEntry>,
    pub power_save: bool,
}
