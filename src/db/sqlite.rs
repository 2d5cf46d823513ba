// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite store with typed operations.
//!
//! Provides high-level operations for:
//! - Users and pets (seeded at startup)
//! - Devices (registration, ownership, unlink)
//! - Schedules (CRUD plus the per-owner query behind plan compilation)
//! - Feeding history
//!
//! Plan caps and the one-schedule-per-slot rule are enforced by the
//! statements themselves, so concurrent requests cannot overshoot them.

use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Pool, QueryBuilder, Sqlite};

use crate::error::AppError;
use crate::models::{
    Device, FeedingRecord, FeedingStatus, NewFeeding, Pet, Plan, ScheduleDefinition, User,
    Weekdays,
};

const MAX_CONNECTIONS: u32 = 5;

/// Fields for inserting a schedule (ID assigned by the store).
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub owner_id: u64,
    pub pet_id: u64,
    pub device_id: String,
    pub hour: u8,
    pub minute: u8,
    pub amount_grams: u32,
    pub weekdays: Weekdays,
    pub active: bool,
}

/// A schedule joined with its pet's name, as plan compilation needs it.
#[derive(Debug, Clone)]
pub struct ScheduleWithPet {
    pub schedule: ScheduleDefinition,
    /// `None` if the pet row is gone
    pub pet_name: Option<String>,
}

// ─── Row Types ───────────────────────────────────────────────────

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    plan: String,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id as u64,
            email: r.email,
            name: r.name,
            plan: Plan::parse(&r.plan),
        }
    }
}

#[derive(FromRow)]
struct PetRow {
    id: i64,
    owner_id: i64,
    device_id: Option<String>,
    name: String,
}

impl From<PetRow> for Pet {
    fn from(r: PetRow) -> Self {
        Pet {
            id: r.id as u64,
            owner_id: r.owner_id as u64,
            device_id: r.device_id,
            name: r.name,
        }
    }
}

#[derive(FromRow)]
struct DeviceRow {
    device_id: String,
    owner_id: Option<i64>,
    name: String,
    auth_token_hash: String,
    firmware_version: Option<String>,
    mac: Option<String>,
    ip: Option<String>,
    power_save: bool,
    registered_at: i64,
}

impl From<DeviceRow> for Device {
    fn from(r: DeviceRow) -> Self {
        Device {
            device_id: r.device_id,
            owner_id: r.owner_id.map(|id| id as u64),
            name: r.name,
            auth_token_hash: r.auth_token_hash,
            firmware_version: r.firmware_version,
            mac: r.mac,
            ip: r.ip,
            power_save: r.power_save,
            registered_at: from_millis(r.registered_at),
        }
    }
}

#[derive(FromRow)]
struct ScheduleRow {
    id: i64,
    owner_id: i64,
    pet_id: i64,
    device_id: String,
    hour: i64,
    minute: i64,
    amount_grams: i64,
    weekdays: i64,
    active: bool,
}

impl From<ScheduleRow> for ScheduleDefinition {
    fn from(r: ScheduleRow) -> Self {
        ScheduleDefinition {
            id: r.id as u64,
            owner_id: r.owner_id as u64,
            pet_id: r.pet_id as u64,
            device_id: r.device_id,
            hour: r.hour as u8,
            minute: r.minute as u8,
            amount_grams: r.amount_grams as u32,
            weekdays: Weekdays::from_bits(r.weekdays as u8),
            active: r.active,
        }
    }
}

#[derive(FromRow)]
struct ScheduleWithPetRow {
    #[sqlx(flatten)]
    schedule: ScheduleRow,
    pet_name: Option<String>,
}

#[derive(FromRow)]
struct FeedingRow {
    id: i64,
    device_id: String,
    pet_id: i64,
    amount_grams: i64,
    trigger_type: String,
    status: String,
    fed_at: i64,
}

impl From<FeedingRow> for FeedingRecord {
    fn from(r: FeedingRow) -> Self {
        FeedingRecord {
            id: r.id as u64,
            device_id: r.device_id,
            pet_id: r.pet_id as u64,
            amount_grams: r.amount_grams as u32,
            trigger: r.trigger_type,
            status: FeedingStatus::parse(&r.status),
            timestamp: from_millis(r.fed_at),
        }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Map a unique-index violation on the schedule slot to `Conflict`.
fn slot_conflict(e: sqlx::Error, hour: u8, minute: u8) -> AppError {
    let duplicate =
        matches!(&e, sqlx::Error::Database(db_err) if db_err.is_unique_violation());
    if duplicate {
        AppError::Conflict(format!(
            "A schedule for this pet already exists at {:02}:{:02}",
            hour, minute
        ))
    } else {
        e.into()
    }
}

/// SQLite-backed store. Cloning shares the connection pool.
#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

impl Db {
    /// Open (creating if needed) the database at `database_url` and bring its
    /// schema up to date.
    ///
    /// Example: `sqlite:/var/lib/feeder-sync/feeder.db`
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Database(format!("Invalid database URL {}: {}", database_url, e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;
        tracing::info!(url = database_url, "Connected to database");
        Ok(db)
    }

    /// Private in-memory database, used by tests.
    ///
    /// An in-memory SQLite database lives as long as its connection, so the
    /// pool holds exactly one that never expires.
    pub async fn in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<StdDuration>)
            .max_lifetime(None::<StdDuration>)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))
    }

    /// Round-trip a trivial query, for health checks.
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn get_user(&self, user_id: u64) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, plan FROM users WHERE id = ?",
        )
        .bind(user_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Resolve the owner credential a device presents at registration: either
    /// the numeric user ID or the account email (case-insensitive).
    pub async fn find_user_by_owner_token(&self, token: &str) -> Result<Option<User>, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }

        if let Ok(id) = token.parse::<u64>() {
            if let Some(user) = self.get_user(id).await? {
                return Ok(Some(user));
            }
        }

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, plan FROM users
             WHERE email = ? COLLATE NOCASE
             ORDER BY id
             LIMIT 1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO users (id, email, name, plan) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               email = excluded.email,
               name = excluded.name,
               plan = excluded.plan",
        )
        .bind(user.id as i64)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.plan.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─── Pet Operations ──────────────────────────────────────────

    pub async fn upsert_pet(&self, pet: &Pet) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO pets (id, owner_id, device_id, name) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               owner_id = excluded.owner_id,
               device_id = excluded.device_id,
               name = excluded.name",
        )
        .bind(pet.id as i64)
        .bind(pet.owner_id as i64)
        .bind(pet.device_id.as_deref())
        .bind(&pet.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_pet(&self, pet_id: u64) -> Result<Option<Pet>, AppError> {
        let row = sqlx::query_as::<_, PetRow>(
            "SELECT id, owner_id, device_id, name FROM pets WHERE id = ?",
        )
        .bind(pet_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Pet::from))
    }

    /// All pets of one owner, ordered by ID.
    pub async fn list_pets(&self, owner_id: u64) -> Result<Vec<Pet>, AppError> {
        let rows = sqlx::query_as::<_, PetRow>(
            "SELECT id, owner_id, device_id, name FROM pets WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Pet::from).collect())
    }

    // ─── Device Operations ───────────────────────────────────────

    pub async fn get_device(&self, device_id: &str) -> Result<Option<Device>, AppError> {
        let row = sqlx::query_as::<_, DeviceRow>(
            "SELECT device_id, owner_id, name, auth_token_hash, firmware_version,
                    mac, ip, power_save, registered_at
             FROM devices WHERE device_id = ?",
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Device::from))
    }

    /// Insert or overwrite `device`, provided its owner holds fewer than
    /// `device_limit` other devices. Returns false when the cap is reached.
    ///
    /// The count and the write are one statement, so two registrations
    /// racing for the last slot cannot both succeed.
    pub async fn register_device(
        &self,
        device: &Device,
        device_limit: usize,
    ) -> Result<bool, AppError> {
        let owner_id = device.owner_id.map(|id| id as i64);
        let result = sqlx::query(
            "INSERT INTO devices (device_id, owner_id, name, auth_token_hash,
                                  firmware_version, mac, ip, power_save, registered_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE (SELECT COUNT(*) FROM devices
                    WHERE owner_id = ? AND device_id <> ?) < ?
             ON CONFLICT(device_id) DO UPDATE SET
               owner_id = excluded.owner_id,
               name = excluded.name,
               auth_token_hash = excluded.auth_token_hash,
               firmware_version = excluded.firmware_version,
               mac = excluded.mac,
               ip = excluded.ip,
               power_save = excluded.power_save,
               registered_at = excluded.registered_at",
        )
        .bind(&device.device_id)
        .bind(owner_id)
        .bind(&device.name)
        .bind(&device.auth_token_hash)
        .bind(device.firmware_version.as_deref())
        .bind(device.mac.as_deref())
        .bind(device.ip.as_deref())
        .bind(device.power_save)
        .bind(device.registered_at.timestamp_millis())
        .bind(owner_id)
        .bind(&device.device_id)
        .bind(device_limit as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Devices currently owned by `owner_id`, ordered by device ID.
    pub async fn list_devices(&self, owner_id: u64) -> Result<Vec<Device>, AppError> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            "SELECT device_id, owner_id, name, auth_token_hash, firmware_version,
                    mac, ip, power_save, registered_at
             FROM devices WHERE owner_id = ? ORDER BY device_id",
        )
        .bind(owner_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Device::from).collect())
    }

    pub async fn set_power_save(
        &self,
        device_id: &str,
        enabled: bool,
    ) -> Result<Option<Device>, AppError> {
        let result = sqlx::query("UPDATE devices SET power_save = ? WHERE device_id = ?")
            .bind(enabled)
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_device(device_id).await
    }

    /// Clear ownership of a device owned by `owner_id`.
    ///
    /// The device row is kept so a later registration can reclaim it. Pets
    /// configured on the device are detached and schedules targeting it are
    /// removed. Returns false if the device is missing or not owned by
    /// `owner_id`.
    pub async fn unlink_device(&self, device_id: &str, owner_id: u64) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE devices SET owner_id = NULL WHERE device_id = ? AND owner_id = ?")
                .bind(device_id)
                .bind(owner_id as i64)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE pets SET device_id = NULL WHERE device_id = ?")
            .bind(device_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM schedules WHERE device_id = ?")
            .bind(device_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // ─── Schedule Operations ─────────────────────────────────────

    pub async fn get_schedule(&self, schedule_id: u64) -> Result<Option<ScheduleDefinition>, AppError> {
        let row = sqlx::query_as::<_, ScheduleRow>(
            "SELECT id, owner_id, pet_id, device_id, hour, minute, amount_grams, weekdays, active
             FROM schedules WHERE id = ?",
        )
        .bind(schedule_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ScheduleDefinition::from))
    }

    /// All schedules of one owner, ordered by ID.
    pub async fn list_schedules(&self, owner_id: u64) -> Result<Vec<ScheduleDefinition>, AppError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            "SELECT id, owner_id, pet_id, device_id, hour, minute, amount_grams, weekdays, active
             FROM schedules WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ScheduleDefinition::from).collect())
    }

    /// Active schedules of one owner across all pets and devices, each
    /// joined with its pet name.
    pub async fn list_active_schedules_with_pets(
        &self,
        owner_id: u64,
    ) -> Result<Vec<ScheduleWithPet>, AppError> {
        let rows = sqlx::query_as::<_, ScheduleWithPetRow>(
            "SELECT s.id, s.owner_id, s.pet_id, s.device_id, s.hour, s.minute,
                    s.amount_grams, s.weekdays, s.active, p.name AS pet_name
             FROM schedules s
             LEFT JOIN pets p ON p.id = s.pet_id
             WHERE s.owner_id = ? AND s.active = 1
             ORDER BY s.id",
        )
        .bind(owner_id as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ScheduleWithPet {
                schedule: r.schedule.into(),
                pet_name: r.pet_name,
            })
            .collect())
    }

    /// Insert a schedule unless its owner already has `schedule_limit`.
    ///
    /// Returns `None` when the cap is reached and `Conflict` when the pet
    /// already has a schedule on that device at that time.
    pub async fn insert_schedule(
        &self,
        new: NewSchedule,
        schedule_limit: usize,
    ) -> Result<Option<ScheduleDefinition>, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO schedules (owner_id, pet_id, device_id, hour, minute,
                                    amount_grams, weekdays, active)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?
             WHERE (SELECT COUNT(*) FROM schedules WHERE owner_id = ?) < ?
             RETURNING id",
        )
        .bind(new.owner_id as i64)
        .bind(new.pet_id as i64)
        .bind(&new.device_id)
        .bind(i64::from(new.hour))
        .bind(i64::from(new.minute))
        .bind(i64::from(new.amount_grams))
        .bind(i64::from(new.weekdays.to_bits()))
        .bind(new.active)
        .bind(new.owner_id as i64)
        .bind(schedule_limit as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| slot_conflict(e, new.hour, new.minute))?;

        Ok(id.map(|id| ScheduleDefinition {
            id: id as u64,
            owner_id: new.owner_id,
            pet_id: new.pet_id,
            device_id: new.device_id,
            hour: new.hour,
            minute: new.minute,
            amount_grams: new.amount_grams,
            weekdays: new.weekdays,
            active: new.active,
        }))
    }

    pub async fn update_schedule(&self, schedule: &ScheduleDefinition) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE schedules SET
               pet_id = ?, device_id = ?, hour = ?, minute = ?,
               amount_grams = ?, weekdays = ?, active = ?
             WHERE id = ?",
        )
        .bind(schedule.pet_id as i64)
        .bind(&schedule.device_id)
        .bind(i64::from(schedule.hour))
        .bind(i64::from(schedule.minute))
        .bind(i64::from(schedule.amount_grams))
        .bind(i64::from(schedule.weekdays.to_bits()))
        .bind(schedule.active)
        .bind(schedule.id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| slot_conflict(e, schedule.hour, schedule.minute))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Schedule {}", schedule.id)));
        }
        Ok(())
    }

    pub async fn delete_schedule(&self, schedule_id: u64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
            .bind(schedule_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Feeding Operations ──────────────────────────────────────

    pub async fn insert_feeding(
        &self,
        new: NewFeeding,
        at: DateTime<Utc>,
    ) -> Result<FeedingRecord, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO feedings (device_id, pet_id, amount_grams, trigger_type, status, fed_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&new.device_id)
        .bind(new.pet_id as i64)
        .bind(i64::from(new.amount_grams))
        .bind(&new.trigger)
        .bind(new.status.as_str())
        .bind(at.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedingRecord {
            id: id as u64,
            device_id: new.device_id,
            pet_id: new.pet_id,
            amount_grams: new.amount_grams,
            trigger: new.trigger,
            status: new.status,
            timestamp: from_millis(at.timestamp_millis()),
        })
    }

    /// Feeding history for the given devices within the last `days` days,
    /// newest first.
    pub async fn list_feedings(
        &self,
        device_ids: &[String],
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<FeedingRecord>, AppError> {
        if device_ids.is_empty() {
            return Ok(Vec::new());
        }
        let since = now - Duration::days(i64::from(days));

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, device_id, pet_id, amount_grams, trigger_type, status, fed_at
             FROM feedings WHERE fed_at >= ",
        );
        query.push_bind(since.timestamp_millis());
        query.push(" AND device_id IN (");
        let mut ids = query.separated(", ");
        for id in device_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");
        query.push(" ORDER BY fed_at DESC, id DESC");

        let rows = query
            .build_query_as::<FeedingRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(FeedingRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64, email: &str) -> User {
        User {
            id,
            email: email.to_string(),
            name: format!("User {}", id),
            plan: Plan::Free,
        }
    }

    fn device(id: &str, owner: u64) -> Device {
        Device {
            device_id: id.to_string(),
            owner_id: Some(owner),
            name: Device::default_name(id),
            auth_token_hash: String::new(),
            firmware_version: Some("1.0.0".to_string()),
            mac: None,
            ip: None,
            power_save: false,
            registered_at: Utc::now(),
        }
    }

    fn new_schedule(owner: u64, pet: u64, device: &str, hour: u8) -> NewSchedule {
        NewSchedule {
            owner_id: owner,
            pet_id: pet,
            device_id: device.to_string(),
            hour,
            minute: 0,
            amount_grams: 80,
            weekdays: Weekdays::from_flags([false, true, false, true, false, true, false]),
            active: true,
        }
    }

    #[tokio::test]
    async fn test_ping_fails_once_closed() {
        let db = Db::in_memory().await.unwrap();
        db.ping().await.unwrap();
        db.pool.close().await;
        assert!(matches!(db.ping().await, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_owner_token_matches_id_or_email() {
        let db = Db::in_memory().await.unwrap();
        db.upsert_user(&user(7, "Alice@Example.com")).await.unwrap();

        let by_id = db.find_user_by_owner_token("7").await.unwrap();
        assert_eq!(by_id.map(|u| u.id), Some(7));

        let by_email = db.find_user_by_owner_token("alice@example.COM").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(7));

        assert!(db.find_user_by_owner_token("8").await.unwrap().is_none());
        assert!(db.find_user_by_owner_token("  ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_device_round_trip() {
        let db = Db::in_memory().await.unwrap();
        let mut dev = device("dev-a", 1);
        dev.power_save = true;
        assert!(db.register_device(&dev, 1).await.unwrap());

        let stored = db.get_device("dev-a").await.unwrap().unwrap();
        assert_eq!(stored.owner_id, Some(1));
        assert!(stored.power_save);
        assert_eq!(stored.firmware_version.as_deref(), Some("1.0.0"));
        assert_eq!(
            stored.registered_at.timestamp_millis(),
            dev.registered_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_register_device_enforces_cap_excluding_itself() {
        let db = Db::in_memory().await.unwrap();
        assert!(db.register_device(&device("dev-a", 1), 2).await.unwrap());
        assert!(db.register_device(&device("dev-b", 1), 2).await.unwrap());
        assert!(!db.register_device(&device("dev-c", 1), 2).await.unwrap());
        assert!(db.get_device("dev-c").await.unwrap().is_none());

        // Re-registering an owned device is not a new slot
        assert!(db.register_device(&device("dev-a", 1), 2).await.unwrap());
        // Other owners are unaffected
        assert!(db.register_device(&device("dev-c", 2), 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_registrations_respect_cap() {
        let db = Db::in_memory().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.register_device(&device(&format!("dev-{}", i), 1), 3)
                    .await
                    .unwrap()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 3);
        assert_eq!(db.list_devices(1).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unlink_requires_ownership_and_cleans_up() {
        let db = Db::in_memory().await.unwrap();
        db.register_device(&device("dev-a", 1), 1).await.unwrap();
        db.upsert_pet(&Pet {
            id: 10,
            owner_id: 1,
            device_id: Some("dev-a".to_string()),
            name: "Rex".to_string(),
        })
        .await
        .unwrap();
        db.insert_schedule(new_schedule(1, 10, "dev-a", 7), 3)
            .await
            .unwrap();

        assert!(!db.unlink_device("dev-a", 2).await.unwrap());
        assert_eq!(db.list_schedules(1).await.unwrap().len(), 1);
        assert!(db.unlink_device("dev-a", 1).await.unwrap());

        let dev = db.get_device("dev-a").await.unwrap().unwrap();
        assert_eq!(dev.owner_id, None);
        assert_eq!(db.get_pet(10).await.unwrap().unwrap().device_id, None);
        assert!(db.list_schedules(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_slot_is_unique() {
        let db = Db::in_memory().await.unwrap();
        let s = db
            .insert_schedule(new_schedule(1, 10, "dev-a", 7), 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(s.weekdays.to_day_indices(), vec![1, 3, 5]);

        let dup = db
            .insert_schedule(new_schedule(1, 10, "dev-a", 7), 10)
            .await
            .unwrap_err();
        assert!(matches!(dup, AppError::Conflict(_)));

        // Another pet may share the slot
        db.insert_schedule(new_schedule(1, 11, "dev-a", 7), 10)
            .await
            .unwrap()
            .unwrap();

        // Moving a schedule onto a taken slot conflicts, keeping its own does not
        let other = db
            .insert_schedule(new_schedule(1, 10, "dev-a", 8), 10)
            .await
            .unwrap()
            .unwrap();
        let mut moved = other.clone();
        moved.hour = 7;
        assert!(matches!(
            db.update_schedule(&moved).await.unwrap_err(),
            AppError::Conflict(_)
        ));
        let mut same_slot = s.clone();
        same_slot.amount_grams = 120;
        db.update_schedule(&same_slot).await.unwrap();
        assert_eq!(
            db.get_schedule(s.id).await.unwrap().unwrap().amount_grams,
            120
        );
    }

    #[tokio::test]
    async fn test_schedule_cap() {
        let db = Db::in_memory().await.unwrap();
        for hour in 0..3 {
            assert!(db
                .insert_schedule(new_schedule(1, 10, "dev-a", hour), 3)
                .await
                .unwrap()
                .is_some());
        }
        assert!(db
            .insert_schedule(new_schedule(1, 10, "dev-a", 9), 3)
            .await
            .unwrap()
            .is_none());
        assert!(db
            .insert_schedule(new_schedule(2, 10, "dev-b", 9), 3)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_active_schedules_join_pet_names() {
        let db = Db::in_memory().await.unwrap();
        db.upsert_pet(&Pet {
            id: 10,
            owner_id: 1,
            device_id: None,
            name: "Rex".to_string(),
        })
        .await
        .unwrap();
        db.insert_schedule(new_schedule(1, 10, "dev-a", 7), 10)
            .await
            .unwrap();
        db.insert_schedule(new_schedule(1, 99, "dev-a", 8), 10)
            .await
            .unwrap();
        let mut paused = new_schedule(1, 10, "dev-a", 9);
        paused.active = false;
        db.insert_schedule(paused, 10).await.unwrap();

        let rows = db.list_active_schedules_with_pets(1).await.unwrap();
        let names: Vec<Option<&str>> = rows.iter().map(|r| r.pet_name.as_deref()).collect();
        assert_eq!(names, vec![Some("Rex"), None]);
    }

    #[tokio::test]
    async fn test_data_survives_reconnect() {
        let dir = std::env::temp_dir().join(format!("feeder-sync-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("reconnect.db");
        let _ = std::fs::remove_file(&path);
        let url = format!("sqlite:{}", path.display());

        {
            let db = Db::connect(&url).await.unwrap();
            db.register_device(&device("dev-a", 1), 1).await.unwrap();
            db.insert_schedule(new_schedule(1, 10, "dev-a", 7), 3)
                .await
                .unwrap();
            db.pool.close().await;
        }

        let db = Db::connect(&url).await.unwrap();
        assert!(db.get_device("dev-a").await.unwrap().is_some());
        assert_eq!(db.list_schedules(1).await.unwrap().len(), 1);
        db.pool.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_feedings_filtered_by_window_newest_first() {
        let db = Db::in_memory().await.unwrap();
        let now = Utc::now();
        let feed = |device: &str| NewFeeding {
            device_id: device.to_string(),
            pet_id: 1,
            amount_grams: 50,
            trigger: "manual".to_string(),
            status: FeedingStatus::Pending,
        };

        db.insert_feeding(feed("dev-a"), now - Duration::days(10)).await.unwrap();
        db.insert_feeding(feed("dev-a"), now - Duration::hours(2)).await.unwrap();
        db.insert_feeding(feed("dev-a"), now - Duration::hours(1)).await.unwrap();
        db.insert_feeding(feed("dev-b"), now).await.unwrap();

        let records = db
            .list_feedings(&["dev-a".to_string()], 7, now)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].timestamp > records[1].timestamp);
        assert_eq!(records[0].status, FeedingStatus::Pending);
        assert_eq!(records[0].trigger, "manual");

        assert!(db.list_feedings(&[], 7, now).await.unwrap().is_empty());
    }
}
