// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device-facing routes (called by feeder firmware, no user session).
//!
//! Apart from registration these never return an error status. Unknown
//! devices and malformed bodies get the same benign answer as a device
//! with nothing to do.

use crate::error::{AppError, Result};
use crate::models::{ScheduleExecutionPlan, Telemetry};
use crate::services::gateway::{FeedLogReport, RegisterRequest, Registration, StatusReport};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Optional header carrying the token issued at registration.
pub const DEVICE_TOKEN_HEADER: &str = "x-device-token";

/// Device routes (public; devices authenticate by ID and optional token).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/devices/register", post(register))
        .route("/api/devices/{device_id}/commands", get(poll_commands))
        .route("/api/devices/{device_id}/schedules", get(poll_schedules))
        .route("/api/devices/{device_id}/status", post(report_status))
        .route("/api/feed/log", post(report_feeding))
}

fn device_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(DEVICE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Acknowledgement for device reports.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReportAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded: Option<bool>,
}

// ─── Registration ────────────────────────────────────────────

async fn register(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Registration>)> {
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let registration = state.gateway.register(req).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

// ─── Polling ─────────────────────────────────────────────────

/// Oldest pending command as `{command, ...payload}`, or `{}`.
async fn poll_commands(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Json<Map<String, Value>> {
    let command = state.gateway.poll_commands(&device_id).await;
    Json(command.map(|c| c.to_wire()).unwrap_or_default())
}

async fn poll_schedules(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Json<ScheduleExecutionPlan> {
    Json(state.gateway.poll_schedules(&device_id).await)
}

// ─── Reports ─────────────────────────────────────────────────

async fn report_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    body: std::result::Result<Json<StatusReport>, JsonRejection>,
) -> Json<ReportAck> {
    // A garbled body still proves the device is alive
    let telemetry = match body {
        Ok(Json(report)) => Telemetry::from(report),
        Err(e) => {
            tracing::debug!(device_id = %device_id, error = %e, "Unparseable status body");
            Telemetry::default()
        }
    };

    state
        .gateway
        .report_status(&device_id, device_token(&headers), telemetry)
        .await;

    Json(ReportAck {
        success: true,
        recorded: None,
    })
}

async fn report_feeding(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: std::result::Result<Json<FeedLogReport>, JsonRejection>,
) -> Json<ReportAck> {
    let recorded = match body {
        Ok(Json(report)) => {
            state
                .gateway
                .report_feeding(report, device_token(&headers))
                .await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable feed log body");
            false
        }
    };

    Json(ReportAck {
        success: true,
        recorded: Some(recorded),
    })
}
