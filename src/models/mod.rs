// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod alert;
pub mod command;
pub mod device;
pub mod feeding;
pub mod schedule;
pub mod user;

pub use alert::{AlertEvent, AlertSeverity, FoodAlertState};
pub use command::{Command, CommandQueueEntry};
pub use device::{Device, PresenceRecord, Telemetry};
pub use feeding::{FeedingRecord, FeedingStatus, NewFeeding};
pub use schedule::{PlanEntry, PortionSize, ScheduleDefinition, ScheduleExecutionPlan, Weekdays};
pub use user::{Pet, Plan, User};
