// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Schedule management and compilation into device execution plans.
//!
//! Every device of an account receives the plan for the whole account, not
//! just for the pets configured on it.
//!
//! The firmware remembers which plan entries already fired today by their
//! position in the list. Entry order is therefore a contract: entries are
//! sorted by (hour, minute, label, schedule ID) and nothing else.

use serde::Deserialize;
use validator::Validate;

use crate::db::{Db, NewSchedule, ScheduleWithPet};
use crate::error::{AppError, Result};
use crate::models::{
    Device, PlanEntry, PortionSize, ScheduleDefinition, ScheduleExecutionPlan, User, Weekdays,
};

/// Label used when a schedule's pet row no longer exists.
const FALLBACK_LABEL: &str = "Pet";

/// User-supplied schedule fields, for both create and update.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleInput {
    pub pet_id: u64,
    #[validate(length(min = 1, max = 64))]
    pub device_id: String,
    #[validate(range(max = 23))]
    pub hour: u8,
    #[validate(range(max = 59))]
    pub minute: u8,
    #[validate(range(min = 1, max = 1000))]
    pub amount_grams: u32,
    #[serde(default)]
    pub weekdays: Weekdays,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Compile schedule rows into ordered plan entries.
///
/// Pure and deterministic: the same rows in any input order give the same
/// output.
pub fn compile_entries(rows: &[ScheduleWithPet]) -> Vec<PlanEntry> {
    let mut keyed: Vec<(u64, PlanEntry)> = rows
        .iter()
        .filter(|row| row.schedule.active)
        .map(|row| {
            let s = &row.schedule;
            let entry = PlanEntry {
                hour: s.hour,
                minute: s.minute,
                size: PortionSize::from_grams(s.amount_grams),
                days: s.weekdays.to_day_indices(),
                label: row
                    .pet_name
                    .clone()
                    .unwrap_or_else(|| FALLBACK_LABEL.to_string()),
            };
            (s.id, entry)
        })
        .collect();

    keyed.sort_by(|(id_a, a), (id_b, b)| {
        (a.hour, a.minute, &a.label, id_a).cmp(&(b.hour, b.minute, &b.label, id_b))
    });

    keyed.into_iter().map(|(_, entry)| entry).collect()
}

/// Schedule CRUD and plan compilation over the store.
#[derive(Clone)]
pub struct ScheduleSync {
    db: Db,
}

impl ScheduleSync {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Plan entries for every active schedule of `owner_id`.
    pub async fn compile_plan(&self, owner_id: u64) -> Result<Vec<PlanEntry>> {
        let rows = self.db.list_active_schedules_with_pets(owner_id).await?;
        Ok(compile_entries(&rows))
    }

    /// The full plan served to a device. An unowned device gets an empty plan.
    pub async fn plan_for_device(&self, device: &Device) -> Result<ScheduleExecutionPlan> {
        let entries = match device.owner_id {
            Some(owner_id) => self.compile_plan(owner_id).await?,
            None => Vec::new(),
        };

        Ok(ScheduleExecutionPlan {
            entries,
            power_save: device.power_save,
        })
    }

    pub async fn list(&self, owner_id: u64) -> Result<Vec<ScheduleDefinition>> {
        self.db.list_schedules(owner_id).await
    }

    pub async fn create(&self, owner: &User, input: ScheduleInput) -> Result<ScheduleDefinition> {
        input.validate()?;
        self.check_targets(owner.id, &input).await?;

        let schedule = self
            .db
            .insert_schedule(
                NewSchedule {
                    owner_id: owner.id,
                    pet_id: input.pet_id,
                    device_id: input.device_id,
                    hour: input.hour,
                    minute: input.minute,
                    amount_grams: input.amount_grams,
                    weekdays: input.weekdays,
                    active: input.active,
                },
                owner.plan.schedule_limit(),
            )
            .await?
            .ok_or_else(|| {
                AppError::Forbidden(format!(
                    "Schedule limit reached for {} plan ({})",
                    owner.plan.as_str(),
                    owner.plan.schedule_limit()
                ))
            })?;

        tracing::info!(
            user_id = owner.id,
            schedule_id = schedule.id,
            device_id = %schedule.device_id,
            "Schedule created"
        );
        Ok(schedule)
    }

    pub async fn update(
        &self,
        owner_id: u64,
        schedule_id: u64,
        input: ScheduleInput,
    ) -> Result<ScheduleDefinition> {
        input.validate()?;
        let mut schedule = self.owned_schedule(owner_id, schedule_id).await?;
        self.check_targets(owner_id, &input).await?;

        schedule.pet_id = input.pet_id;
        schedule.device_id = input.device_id;
        schedule.hour = input.hour;
        schedule.minute = input.minute;
        schedule.amount_grams = input.amount_grams;
        schedule.weekdays = input.weekdays;
        schedule.active = input.active;
        self.db.update_schedule(&schedule).await?;

        tracing::info!(user_id = owner_id, schedule_id, "Schedule updated");
        Ok(schedule)
    }

    pub async fn delete(&self, owner_id: u64, schedule_id: u64) -> Result<()> {
        self.owned_schedule(owner_id, schedule_id).await?;
        self.db.delete_schedule(schedule_id).await?;
        tracing::info!(user_id = owner_id, schedule_id, "Schedule deleted");
        Ok(())
    }

    async fn owned_schedule(&self, owner_id: u64, schedule_id: u64) -> Result<ScheduleDefinition> {
        self.db
            .get_schedule(schedule_id)
            .await?
            .filter(|s| s.owner_id == owner_id)
            .ok_or_else(|| AppError::NotFound("Schedule not found".to_string()))
    }

    /// Pet and device must both belong to the caller.
    async fn check_targets(&self, owner_id: u64, input: &ScheduleInput) -> Result<()> {
        let pet_owned = self
            .db
            .get_pet(input.pet_id)
            .await?
            .is_some_and(|p| p.owner_id == owner_id);
        if !pet_owned {
            return Err(AppError::NotFound("Pet not found".to_string()));
        }

        let device_owned = self
            .db
            .get_device(&input.device_id)
            .await?
            .is_some_and(|d| d.is_owned_by(owner_id));
        if !device_owned {
            return Err(AppError::device_not_found());
        }
        Ok(())
    }
}
