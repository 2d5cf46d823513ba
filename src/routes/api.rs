// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Device, FeedingRecord, ScheduleDefinition};
use crate::services::gateway::{DeviceStatus, FeedNow};
use crate::services::ScheduleInput;
use crate::time_utils::history_window_days;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_HISTORY_DAYS: u32 = 7;
const MAX_HISTORY_DAYS: u32 = 90;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{device_id}", axum::routing::delete(unlink_device))
        .route("/api/devices/{device_id}/presence", get(device_presence))
        .route("/api/devices/{device_id}/command", post(send_command))
        .route("/api/devices/{device_id}/power-save", put(set_power_save))
        .route("/api/feed/now", post(feed_now))
        .route("/api/feed/history", get(feeding_history))
        .route("/api/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/api/schedules/{id}",
            put(update_schedule).delete(delete_schedule),
        )
}

/// Generic success response.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SuccessResponse {
    pub success: bool,
}

// ─── Devices ─────────────────────────────────────────────────

async fn list_devices(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<DeviceStatus>>> {
    Ok(Json(state.gateway.list_devices(user.user_id).await?))
}

async fn device_presence(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceStatus>> {
    Ok(Json(
        state.gateway.device_status(user.user_id, &device_id).await?,
    ))
}

async fn unlink_device(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(device_id): Path<String>,
) -> Result<Json<SuccessResponse>> {
    state.gateway.unlink(user.user_id, &device_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Command request body. `data` is passed through as the payload.
#[derive(Deserialize, Validate)]
pub struct CommandRequest {
    #[validate(length(min = 1, max = 32))]
    pub command: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct CommandAccepted {
    pub success: bool,
    /// Commands now waiting for the device's next poll
    pub pending_commands: usize,
}

async fn send_command(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(device_id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Result<(StatusCode, Json<CommandAccepted>)> {
    req.validate()?;
    let pending = state
        .gateway
        .send_command(user.user_id, &device_id, &req.command, req.data)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CommandAccepted {
            success: true,
            pending_commands: pending,
        }),
    ))
}

#[derive(Deserialize)]
pub struct PowerSaveRequest {
    pub enabled: bool,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct PowerSaveResponse {
    pub device_id: String,
    pub power_save: bool,
}

async fn set_power_save(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(device_id): Path<String>,
    Json(req): Json<PowerSaveRequest>,
) -> Result<Json<PowerSaveResponse>> {
    let Device {
        device_id,
        power_save,
        ..
    } = state
        .gateway
        .set_power_save(user.user_id, &device_id, req.enabled)
        .await?;

    Ok(Json(PowerSaveResponse {
        device_id,
        power_save,
    }))
}

// ─── Feeding ─────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct FeedNowRequest {
    #[serde(alias = "deviceId")]
    #[validate(length(min = 1, max = 64))]
    pub device_id: String,
    #[serde(alias = "petId")]
    pub pet_id: u64,
    /// Portion in grams
    #[serde(alias = "amount_grams", alias = "amountGrams")]
    #[validate(range(min = 1, max = 1000))]
    pub amount: u32,
}

async fn feed_now(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<FeedNowRequest>,
) -> Result<(StatusCode, Json<FeedingRecord>)> {
    req.validate()?;
    let record = state
        .gateway
        .feed_now(
            user.user_id,
            FeedNow {
                device_id: req.device_id,
                pet_id: req.pet_id,
                amount_grams: req.amount,
            },
        )
        .await?;

    Ok((StatusCode::ACCEPTED, Json(record)))
}

#[derive(Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub days: Option<u32>,
}

async fn feeding_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<FeedingRecord>>> {
    let days = history_window_days(params.days, DEFAULT_HISTORY_DAYS, MAX_HISTORY_DAYS);
    let records = state
        .gateway
        .feeding_history(user.user_id, params.device_id.as_deref(), days)
        .await?;
    Ok(Json(records))
}

// ─── Schedules ───────────────────────────────────────────────

async fn list_schedules(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ScheduleDefinition>>> {
    Ok(Json(state.gateway.list_schedules(user.user_id).await?))
}

async fn create_schedule(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<ScheduleInput>,
) -> Result<(StatusCode, Json<ScheduleDefinition>)> {
    let schedule = state.gateway.create_schedule(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
    Json(input): Json<ScheduleInput>,
) -> Result<Json<ScheduleDefinition>> {
    Ok(Json(
        state.gateway.update_schedule(user.user_id, id, input).await?,
    ))
}

async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<u64>,
) -> Result<Json<SuccessResponse>> {
    state.gateway.delete_schedule(user.user_id, id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
