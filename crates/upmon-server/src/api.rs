//! REST surface: ping intake, unit management, and stats.
//!
//! Ping intake accepts both GET and POST so a cron line can stay a plain
//! `curl` with no flags. All status transitions go through the
//! dispatcher; handlers never mutate rows directly.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use upmon_common::types::{
    AnomalySensitivity, DurationStats, DurationTrend, MonitoredUnit, PingKind, ProbeConfig,
    ScheduleKind, UnitKind, UnitStatus,
};
use upmon_engine::machine::{self, UnitEvent};
use upmon_engine::schedule;
use upmon_storage::error::StorageError;

use crate::dispatch::DispatchError;
use crate::state::AppState;

/// Error shape returned to clients as `{"error": "..."}`.
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "API handler failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::UnknownUnit(id) => ApiError::NotFound(format!("unknown unit: {id}")),
            DispatchError::Contention { .. } => ApiError::Conflict(e.to_string()),
            DispatchError::Schedule(e) => ApiError::BadRequest(e.to_string()),
            DispatchError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: (Utc::now() - state.start_time).num_seconds(),
    })
}

// ---- Ping intake ----

#[derive(Serialize)]
pub struct PingResponse {
    pub unit_id: String,
    pub status: UnitStatus,
}

pub async fn ping_success(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PingResponse>, ApiError> {
    apply_ping(&state, &id, PingKind::Success).await
}

pub async fn ping_start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PingResponse>, ApiError> {
    apply_ping(&state, &id, PingKind::Start).await
}

pub async fn ping_fail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PingResponse>, ApiError> {
    apply_ping(&state, &id, PingKind::Fail).await
}

async fn apply_ping(
    state: &AppState,
    id: &str,
    kind: PingKind,
) -> Result<Json<PingResponse>, ApiError> {
    let unit = state
        .dispatcher
        .dispatch(id, &UnitEvent::Ping(kind), Utc::now())
        .await?;
    Ok(Json(PingResponse {
        unit_id: unit.id,
        status: unit.status,
    }))
}

// ---- Unit management ----

#[derive(Debug, Deserialize)]
pub struct CreateUnitRequest {
    pub project_id: String,
    pub name: String,
    pub kind: UnitKind,
    pub schedule: ScheduleKind,
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,
    #[serde(default)]
    pub reminder_interval_hours: Option<u32>,
    #[serde(default = "default_alert_on_recovery")]
    pub alert_on_recovery: bool,
    #[serde(default = "default_sensitivity")]
    pub anomaly_sensitivity: AnomalySensitivity,
    #[serde(default)]
    pub probe: Option<ProbeConfig>,
}

fn default_grace_seconds() -> u64 {
    300
}

fn default_alert_on_recovery() -> bool {
    true
}

fn default_sensitivity() -> AnomalySensitivity {
    AnomalySensitivity::Normal
}

pub async fn create_unit(
    State(state): State<AppState>,
    Json(req): Json<CreateUnitRequest>,
) -> Result<(StatusCode, Json<MonitoredUnit>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    if !machine::schedule_matches_kind(req.kind, &req.schedule) {
        return Err(ApiError::BadRequest(format!(
            "schedule type is not valid for a {} unit",
            req.kind
        )));
    }
    schedule::validate_schedule(&req.schedule).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if req.kind == UnitKind::HttpMonitor && req.probe.is_none() {
        return Err(ApiError::BadRequest(
            "HTTP monitors require a probe config".into(),
        ));
    }

    let now = Utc::now();
    let unit = MonitoredUnit {
        id: upmon_common::id::next_id(),
        project_id: req.project_id,
        name: req.name,
        kind: req.kind,
        schedule: req.schedule,
        grace_seconds: req.grace_seconds,
        status: UnitStatus::New,
        last_seen_at: None,
        last_started_at: None,
        last_checked_at: None,
        last_response_ms: None,
        next_expected_at: machine::initial_deadline(req.kind, now),
        last_alert_at: None,
        failing_since: None,
        last_error: None,
        reminder_interval_hours: req.reminder_interval_hours,
        alert_on_recovery: req.alert_on_recovery,
        anomaly_sensitivity: req.anomaly_sensitivity,
        probe: req.probe,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    state.repo.insert(&unit)?;

    tracing::info!(unit_id = %unit.id, name = %unit.name, kind = %unit.kind, "Unit created");
    Ok((StatusCode::CREATED, Json(unit)))
}

pub async fn list_units(
    State(state): State<AppState>,
) -> Result<Json<Vec<MonitoredUnit>>, ApiError> {
    Ok(Json(state.repo.list()?))
}

pub async fn get_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MonitoredUnit>, ApiError> {
    let unit = state
        .repo
        .load(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("unknown unit: {id}")))?;
    Ok(Json(unit))
}

pub async fn delete_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.repo.delete(&id)? {
        tracing::info!(unit_id = %id, "Unit deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("unknown unit: {id}")))
    }
}

pub async fn pause_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MonitoredUnit>, ApiError> {
    let unit = state
        .dispatcher
        .dispatch(&id, &UnitEvent::Pause, Utc::now())
        .await?;
    tracing::info!(unit_id = %id, "Unit paused");
    Ok(Json(unit))
}

pub async fn resume_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MonitoredUnit>, ApiError> {
    let unit = state
        .dispatcher
        .dispatch(&id, &UnitEvent::Resume, Utc::now())
        .await?;
    tracing::info!(unit_id = %id, "Unit resumed");
    Ok(Json(unit))
}

// ---- Duration stats ----

#[derive(Serialize)]
pub struct UnitStatsResponse {
    pub unit_id: String,
    pub stats: Option<DurationStats>,
    pub trend: Option<DurationTrend>,
}

pub async fn unit_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UnitStatsResponse>, ApiError> {
    let unit = state
        .repo
        .load(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("unknown unit: {id}")))?;
    Ok(Json(UnitStatsResponse {
        stats: state.stats.stats(&unit.id),
        trend: state.stats.trend(&unit.id, unit.anomaly_sensitivity),
        unit_id: unit.id,
    }))
}
