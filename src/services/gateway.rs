// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device gateway: the single entry point for device traffic and for user
//! actions that reach a device.
//!
//! Device-facing operations never fail. Unknown devices, bad tokens and
//! store errors all degrade to empty answers, so misconfigured hardware does
//! not spin retrying. User-facing operations return [`AppError`].

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::db::Db;
use crate::error::{AppError, Result};
use crate::models::command::names;
use crate::models::device::clamp_percent;
use crate::models::{
    Command, Device, FeedingRecord, FeedingStatus, NewFeeding, Pet, PortionSize,
    ScheduleDefinition, ScheduleExecutionPlan, Telemetry, User,
};
use crate::services::alerts::AlertEngine;
use crate::services::command_queue::CommandQueue;
use crate::services::device_auth;
use crate::services::notifier::{Notification, NotificationSink};
use crate::services::presence::PresenceTracker;
use crate::services::schedule_sync::{ScheduleInput, ScheduleSync};
use crate::time_utils::format_utc_rfc3339;

const MAX_DEVICE_ID_LEN: usize = 64;
const DEFAULT_FEED_GRAMS: u32 = 100;
const DEFAULT_FEED_TRIGGER: &str = "scheduled";

// ─── Device-facing payloads ──────────────────────────────────────

/// Registration body. Older firmware sends `userToken`/`firmware`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default, alias = "device_id")]
    pub device_id: Option<String>,
    #[serde(
        default,
        alias = "userToken",
        alias = "owner_token",
        alias = "user_token",
        deserialize_with = "string_or_number"
    )]
    pub owner_token: Option<String>,
    #[serde(default, alias = "firmware", alias = "firmware_version")]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Returned once at registration; the auth token is never shown again.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub auth_token: String,
    pub owner_id: u64,
    pub device_name: String,
    pub server_time: String,
}

/// Feeding executed by a device.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedLogReport {
    #[serde(default, alias = "device_id")]
    pub device_id: String,
    #[serde(default, alias = "size", alias = "portion_size")]
    pub portion_size: Option<String>,
    #[serde(default, alias = "trigger", alias = "trigger_type")]
    pub trigger_type: Option<String>,
    #[serde(default, alias = "pet_name")]
    pub pet_name: Option<String>,
    #[serde(default, alias = "food_level_after")]
    pub food_level_after: Option<f64>,
}

/// Status push body. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(default, alias = "food_level_percent", alias = "foodLevel", alias = "food_level")]
    pub food_level_percent: Option<f64>,
    #[serde(default, alias = "signal_strength", alias = "rssi")]
    pub signal_strength: Option<i32>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, alias = "schedules_count")]
    pub schedules_count: Option<u32>,
}

impl From<StatusReport> for Telemetry {
    fn from(report: StatusReport) -> Self {
        Telemetry {
            food_level_percent: report.food_level_percent.map(clamp_percent),
            signal_strength: report.signal_strength,
            ip: report.ip,
            mode: report.mode,
            schedules_count: report.schedules_count,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ─── User-facing views ───────────────────────────────────────────

/// Device as shown on the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub device_id: String,
    pub name: String,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contact: Option<String>,
    pub telemetry: Telemetry,
    pub pending_commands: usize,
    pub power_save: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

/// Manual feed request.
#[derive(Debug, Clone)]
pub struct FeedNow {
    pub device_id: String,
    pub pet_id: u64,
    pub amount_grams: u32,
}

/// Façade over presence, command queue, schedules and alerts.
pub struct DeviceGateway {
    db: Db,
    presence: Arc<PresenceTracker>,
    queue: Arc<CommandQueue>,
    alerts: Arc<AlertEngine>,
    schedules: ScheduleSync,
    notifier: Arc<dyn NotificationSink>,
}

impl DeviceGateway {
    pub fn new(
        db: Db,
        presence: Arc<PresenceTracker>,
        queue: Arc<CommandQueue>,
        alerts: Arc<AlertEngine>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            schedules: ScheduleSync::new(db.clone()),
            db,
            presence,
            queue,
            alerts,
            notifier,
        }
    }

    // ─── Device Operations ───────────────────────────────────────

    /// Link a device to the account named by its owner token and issue a
    /// fresh auth token.
    ///
    /// Re-registering to the same owner keeps the device's name and
    /// settings. Moving to a new owner also discards commands queued for
    /// the old one.
    pub async fn register(&self, req: RegisterRequest) -> Result<Registration> {
        let device_id = req
            .device_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("deviceId is required".to_string()))?
            .to_string();
        if device_id.len() > MAX_DEVICE_ID_LEN {
            return Err(AppError::BadRequest("deviceId is too long".to_string()));
        }
        let owner_token = req
            .owner_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::BadRequest("ownerToken is required".to_string()))?;

        let user = self
            .db
            .find_user_by_owner_token(owner_token)
            .await?
            .ok_or_else(|| {
                tracing::warn!(device_id = %device_id, "Registration with invalid owner token");
                AppError::Unauthorized
            })?;

        let existing = self.db.get_device(&device_id).await?;
        let same_owner = existing.as_ref().is_some_and(|d| d.is_owned_by(user.id));
        let previous_owner = existing.as_ref().and_then(|d| d.owner_id);

        let auth_token = device_auth::generate_token()?;
        let now = Utc::now();
        let device = Device {
            name: match &existing {
                Some(d) if same_owner => d.name.clone(),
                _ => Device::default_name(&device_id),
            },
            owner_id: Some(user.id),
            auth_token_hash: device_auth::hash_token(&auth_token),
            firmware_version: req
                .firmware_version
                .or_else(|| existing.as_ref().and_then(|d| d.firmware_version.clone())),
            mac: req
                .mac
                .or_else(|| existing.as_ref().and_then(|d| d.mac.clone())),
            ip: req.ip.or_else(|| existing.as_ref().and_then(|d| d.ip.clone())),
            power_save: same_owner && existing.as_ref().is_some_and(|d| d.power_save),
            registered_at: now,
            device_id,
        };
        if !self.db.register_device(&device, user.plan.device_limit()).await? {
            tracing::info!(
                user_id = user.id,
                device_id = %device.device_id,
                plan = user.plan.as_str(),
                "Device limit reached"
            );
            return Err(AppError::Forbidden(format!(
                "Device limit reached for {} plan ({})",
                user.plan.as_str(),
                user.plan.device_limit()
            )));
        }

        if !same_owner {
            let dropped = self.queue.clear(&device.device_id);
            if previous_owner.is_some() {
                tracing::warn!(
                    device_id = %device.device_id,
                    previous_owner,
                    new_owner = user.id,
                    dropped,
                    "Device changed owner"
                );
            }
        }
        self.presence.reset(&device.device_id);
        self.alerts.reset(&device.device_id);

        tracing::info!(
            user_id = user.id,
            device_id = %device.device_id,
            firmware = device.firmware_version.as_deref().unwrap_or("unknown"),
            "Device registered"
        );

        Ok(Registration {
            auth_token,
            owner_id: user.id,
            device_name: device.name,
            server_time: format_utc_rfc3339(now),
        })
    }

    /// Hand the device its oldest pending command, if any.
    pub async fn poll_commands(&self, device_id: &str) -> Option<Command> {
        let device = self.known_device(device_id, None).await?;
        self.touch(&device, Telemetry::default());

        let command = self.queue.dequeue_one(device_id);
        if let Some(cmd) = &command {
            tracing::info!(device_id, command = %cmd.name, "Command delivered");
        }
        command
    }

    /// Compiled schedule plan for the device's account.
    pub async fn poll_schedules(&self, device_id: &str) -> ScheduleExecutionPlan {
        let Some(device) = self.known_device(device_id, None).await else {
            return ScheduleExecutionPlan::default();
        };
        self.touch(&device, Telemetry::default());

        match self.schedules.plan_for_device(&device).await {
            Ok(plan) => {
                tracing::debug!(device_id, entries = plan.entries.len(), "Schedules served");
                plan
            }
            Err(e) => {
                tracing::warn!(device_id, error = %e, "Failed to compile plan");
                ScheduleExecutionPlan {
                    entries: Vec::new(),
                    power_save: device.power_save,
                }
            }
        }
    }

    /// Record a status push: presence, telemetry and food-level alerting.
    pub async fn report_status(&self, device_id: &str, token: Option<&str>, telemetry: Telemetry) {
        let Some(device) = self.known_device(device_id, token).await else {
            return;
        };

        let level = telemetry.food_level_percent;
        self.touch(&device, telemetry);
        if let Some(level) = level {
            self.evaluate_food_level(&device, level);
        }
    }

    /// Record a feeding the device executed. Returns whether a history row
    /// was written; the device is told success either way.
    pub async fn report_feeding(&self, report: FeedLogReport, token: Option<&str>) -> bool {
        let device_id = report.device_id.trim();
        let Some(device) = self.known_device(device_id, token).await else {
            return false;
        };

        let level = report.food_level_after.map(clamp_percent);
        self.touch(
            &device,
            Telemetry {
                food_level_percent: level,
                ..Default::default()
            },
        );
        if let Some(level) = level {
            self.evaluate_food_level(&device, level);
        }

        let Some(owner_id) = device.owner_id else {
            return false;
        };

        let size = report.portion_size.as_deref().and_then(PortionSize::parse);
        let amount_grams = size.map_or(DEFAULT_FEED_GRAMS, PortionSize::nominal_grams);
        let trigger = report
            .trigger_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_FEED_TRIGGER.to_string());

        let pet = match self
            .resolve_pet(owner_id, &device.device_id, report.pet_name.as_deref())
            .await
        {
            Ok(Some(pet)) => pet,
            Ok(None) => {
                tracing::warn!(
                    device_id = %device.device_id,
                    pet_name = report.pet_name.as_deref().unwrap_or(""),
                    "No unambiguous pet for feeding, history not recorded"
                );
                return false;
            }
            Err(e) => {
                tracing::warn!(device_id = %device.device_id, error = %e, "Pet lookup failed");
                return false;
            }
        };

        let record = match self
            .db
            .insert_feeding(
                NewFeeding {
                    device_id: device.device_id.clone(),
                    pet_id: pet.id,
                    amount_grams,
                    trigger,
                    status: FeedingStatus::Success,
                },
                Utc::now(),
            )
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(device_id = %device.device_id, error = %e, "Failed to record feeding");
                return false;
            }
        };

        tracing::info!(
            device_id = %device.device_id,
            pet = %pet.name,
            amount_grams,
            "Feeding logged"
        );
        self.notifier
            .notify(owner_id, Notification::FeedingCompleted(record));
        true
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Queue an arbitrary command for a device the user owns.
    ///
    /// `data` becomes the command payload. A `feed` command naming one of the
    /// user's pets also records a pending feeding.
    pub async fn send_command(
        &self,
        user_id: u64,
        device_id: &str,
        name: &str,
        data: Option<Value>,
    ) -> Result<usize> {
        let device = self.owned_device(user_id, device_id).await?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("command is required".to_string()));
        }

        let payload = match data {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };

        if name == names::FEED {
            self.record_requested_feed(user_id, &device, &payload).await?;
        }

        self.queue
            .enqueue(&device.device_id, Command::with_payload(name, payload));
        tracing::info!(user_id, device_id, command = name, "Command sent to device");
        Ok(self.queue.pending(&device.device_id))
    }

    /// Queue a manual feeding and record it as pending.
    pub async fn feed_now(&self, user_id: u64, req: FeedNow) -> Result<FeedingRecord> {
        let device = self.owned_device(user_id, &req.device_id).await?;
        let pet = self
            .db
            .get_pet(req.pet_id)
            .await?
            .filter(|p| p.owner_id == user_id && p.device_id.as_deref() == Some(&device.device_id))
            .ok_or_else(|| AppError::NotFound("Pet not found".to_string()))?;

        let mut payload = Map::new();
        payload.insert("pet_id".to_string(), Value::from(pet.id));
        payload.insert("amount".to_string(), Value::from(req.amount_grams));
        payload.insert(
            "size".to_string(),
            Value::from(PortionSize::from_grams(req.amount_grams).as_str()),
        );
        payload.insert("trigger".to_string(), Value::from("manual"));
        self.queue
            .enqueue(&device.device_id, Command::with_payload(names::FEED, payload));

        let record = self
            .db
            .insert_feeding(
                NewFeeding {
                    device_id: device.device_id.clone(),
                    pet_id: pet.id,
                    amount_grams: req.amount_grams,
                    trigger: "manual".to_string(),
                    status: FeedingStatus::Pending,
                },
                Utc::now(),
            )
            .await?;

        self.notifier.notify(
            user_id,
            Notification::FeedingRequested {
                device_id: device.device_id.clone(),
                pet_id: pet.id,
                amount_grams: req.amount_grams,
            },
        );
        tracing::info!(
            user_id,
            device_id = %device.device_id,
            pet_id = pet.id,
            amount_grams = req.amount_grams,
            "Manual feeding initiated"
        );
        Ok(record)
    }

    /// Toggle power-save mode and tell the device to re-pull its settings.
    pub async fn set_power_save(&self, user_id: u64, device_id: &str, enabled: bool) -> Result<Device> {
        self.owned_device(user_id, device_id).await?;
        let device = self
            .db
            .set_power_save(device_id, enabled)
            .await?
            .ok_or_else(AppError::device_not_found)?;

        self.queue.enqueue(device_id, Command::sync());
        tracing::info!(user_id, device_id, enabled, "Power save updated");
        Ok(device)
    }

    /// All of the user's devices with live presence.
    pub async fn list_devices(&self, user_id: u64) -> Result<Vec<DeviceStatus>> {
        let devices = self.db.list_devices(user_id).await?;
        Ok(devices.iter().map(|d| self.status_of(d)).collect())
    }

    pub async fn device_status(&self, user_id: u64, device_id: &str) -> Result<DeviceStatus> {
        let device = self.owned_device(user_id, device_id).await?;
        Ok(self.status_of(&device))
    }

    /// Detach a device from the user and tell it so.
    pub async fn unlink(&self, user_id: u64, device_id: &str) -> Result<()> {
        if !self.db.unlink_device(device_id, user_id).await? {
            return Err(AppError::device_not_found());
        }

        let mut payload = Map::new();
        payload.insert(
            "message".to_string(),
            Value::from("Device has been unlinked from account"),
        );
        self.queue
            .enqueue(device_id, Command::with_payload(names::UNLINK, payload));
        self.alerts.reset(device_id);

        tracing::info!(user_id, device_id, "Device unlinked");
        Ok(())
    }

    /// Feeding history across the user's devices, or one device, newest
    /// first.
    pub async fn feeding_history(
        &self,
        user_id: u64,
        device_id: Option<&str>,
        days: u32,
    ) -> Result<Vec<FeedingRecord>> {
        let device_ids = match device_id {
            Some(id) => vec![self.owned_device(user_id, id).await?.device_id],
            None => self
                .db
                .list_devices(user_id)
                .await?
                .into_iter()
                .map(|d| d.device_id)
                .collect(),
        };
        self.db.list_feedings(&device_ids, days, Utc::now()).await
    }

    pub async fn list_schedules(&self, user_id: u64) -> Result<Vec<ScheduleDefinition>> {
        self.schedules.list(user_id).await
    }

    pub async fn create_schedule(&self, user_id: u64, input: ScheduleInput) -> Result<ScheduleDefinition> {
        let user = self.user(user_id).await?;
        let schedule = self.schedules.create(&user, input).await?;
        self.sync_owner_devices(user_id).await?;
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        user_id: u64,
        schedule_id: u64,
        input: ScheduleInput,
    ) -> Result<ScheduleDefinition> {
        let schedule = self.schedules.update(user_id, schedule_id, input).await?;
        self.sync_owner_devices(user_id).await?;
        Ok(schedule)
    }

    pub async fn delete_schedule(&self, user_id: u64, schedule_id: u64) -> Result<()> {
        self.schedules.delete(user_id, schedule_id).await?;
        self.sync_owner_devices(user_id).await
    }

    // ─── Maintenance ─────────────────────────────────────────────

    /// Drop presence and alert state idle for longer than `max_idle`.
    pub fn evict_idle(&self, max_idle: std::time::Duration) -> (usize, usize) {
        (
            self.presence.evict_inactive(max_idle),
            self.alerts.evict_inactive(max_idle),
        )
    }

    // ─── Helpers ─────────────────────────────────────────────────

    /// Registered device matching `token` when one is presented. Lookup
    /// failures are treated as unknown.
    async fn known_device(&self, device_id: &str, token: Option<&str>) -> Option<Device> {
        if device_id.is_empty() || device_id.len() > MAX_DEVICE_ID_LEN {
            return None;
        }

        let device = match self.db.get_device(device_id).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                tracing::debug!(device_id, "Request from unknown device");
                return None;
            }
            Err(e) => {
                tracing::warn!(device_id, error = %e, "Device lookup failed");
                return None;
            }
        };

        if let Some(token) = token {
            if !device_auth::verify_token(token, &device.auth_token_hash) {
                tracing::warn!(device_id, "Device token mismatch");
                return None;
            }
        }
        Some(device)
    }

    /// Record contact and tell the owner when the device comes back online.
    fn touch(&self, device: &Device, telemetry: Telemetry) {
        let came_online = self.presence.record_contact(&device.device_id, telemetry);
        if let (true, Some(owner_id)) = (came_online, device.owner_id) {
            self.notifier.notify(
                owner_id,
                Notification::DeviceOnline {
                    device_id: device.device_id.clone(),
                    at: Utc::now(),
                },
            );
        }
    }

    fn evaluate_food_level(&self, device: &Device, level: u8) {
        if let Some(alert) = self.alerts.evaluate(&device.device_id, level) {
            if let Some(owner_id) = device.owner_id {
                self.notifier.notify(owner_id, Notification::FoodAlert(alert));
            }
        }
    }

    fn status_of(&self, device: &Device) -> DeviceStatus {
        let snapshot = self.presence.snapshot(&device.device_id);

        if self.presence.observe(&device.device_id) {
            if let (Some(owner_id), Some(snap)) = (device.owner_id, &snapshot) {
                tracing::info!(device_id = %device.device_id, "Device went offline");
                self.notifier.notify(
                    owner_id,
                    Notification::DeviceOffline {
                        device_id: device.device_id.clone(),
                        last_contact: snap.last_contact,
                    },
                );
            }
        }

        DeviceStatus {
            device_id: device.device_id.clone(),
            name: device.name.clone(),
            online: self.presence.is_online(&device.device_id),
            last_contact: snapshot.as_ref().map(|s| format_utc_rfc3339(s.last_contact)),
            telemetry: snapshot.map(|s| s.telemetry).unwrap_or_default(),
            pending_commands: self.queue.pending(&device.device_id),
            power_save: device.power_save,
            firmware_version: device.firmware_version.clone(),
        }
    }

    async fn owned_device(&self, user_id: u64, device_id: &str) -> Result<Device> {
        self.db
            .get_device(device_id)
            .await?
            .filter(|d| d.is_owned_by(user_id))
            .ok_or_else(AppError::device_not_found)
    }

    async fn user(&self, user_id: u64) -> Result<User> {
        self.db.get_user(user_id).await?.ok_or(AppError::Unauthorized)
    }

    /// Pet named `pet_name` among the owner's pets, if exactly one matches;
    /// otherwise the single pet configured on the device.
    async fn resolve_pet(
        &self,
        owner_id: u64,
        device_id: &str,
        pet_name: Option<&str>,
    ) -> Result<Option<Pet>> {
        let pets = self.db.list_pets(owner_id).await?;

        if let Some(name) = pet_name.map(str::trim).filter(|n| !n.is_empty()) {
            let mut named = pets.iter().filter(|p| p.name == name);
            if let (Some(pet), None) = (named.next(), named.next()) {
                return Ok(Some(pet.clone()));
            }
        }

        let mut on_device = pets
            .iter()
            .filter(|p| p.device_id.as_deref() == Some(device_id));
        Ok(match (on_device.next(), on_device.next()) {
            (Some(pet), None) => Some(pet.clone()),
            _ => None,
        })
    }

    async fn record_requested_feed(
        &self,
        user_id: u64,
        device: &Device,
        payload: &Map<String, Value>,
    ) -> Result<()> {
        let Some(pet_id) = payload.get("pet_id").and_then(Value::as_u64) else {
            return Ok(());
        };
        let owns_pet = self
            .db
            .get_pet(pet_id)
            .await?
            .is_some_and(|p| p.owner_id == user_id);
        if !owns_pet {
            return Ok(());
        }

        let amount_grams = payload
            .get("amount")
            .and_then(Value::as_u64)
            .and_then(|a| u32::try_from(a).ok())
            .unwrap_or(DEFAULT_FEED_GRAMS);
        self.db
            .insert_feeding(
                NewFeeding {
                    device_id: device.device_id.clone(),
                    pet_id,
                    amount_grams,
                    trigger: "remote".to_string(),
                    status: FeedingStatus::Pending,
                },
                Utc::now(),
            )
            .await?;
        Ok(())
    }

    async fn sync_owner_devices(&self, user_id: u64) -> Result<()> {
        let devices = self.db.list_devices(user_id).await?;
        for device in &devices {
            self.queue.enqueue(&device.device_id, Command::sync());
        }
        tracing::debug!(user_id, devices = devices.len(), "Queued schedule sync");
        Ok(())
    }
}
