//! Internal scheduling API used by the chat-facing layer.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskwarden_core::triggers::{ScheduledTrigger, TriggerStore};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub item: String,
    pub user: String,
    /// Defaults to "now" when omitted
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub trigger_id: String,
}

/// `POST /api/triggers` -- schedule (upsert) a re-evaluation.
pub async fn schedule(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduleResponse>), AppError> {
    let at = req.at.unwrap_or_else(|| state.scheduler.now());
    let trigger_id = state.scheduler.schedule(req.item, at, req.user)?;
    Ok((StatusCode::CREATED, Json(ScheduleResponse { trigger_id })))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// False when the trigger had already fired or been cancelled
    pub cancelled: bool,
}

/// `DELETE /api/triggers/{id}` -- cancel a pending trigger. No-op (200,
/// `cancelled: false`) when the trigger is already terminal.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = state.scheduler.cancel(&id)?;
    Ok(Json(CancelResponse { cancelled }))
}

/// `GET /api/triggers` -- list every stored trigger.
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScheduledTrigger>>, AppError> {
    Ok(Json(state.scheduler.store().all()?))
}

#[derive(Debug, Serialize)]
pub struct TickResponse {
    pub due: usize,
    pub fired: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// `POST /api/tick` -- run one scheduler tick immediately. Operational
/// escape hatch; the periodic loop calls the same path.
pub async fn tick(State(state): State<AppState>) -> Result<Json<TickResponse>, AppError> {
    let scheduler = state.scheduler.clone();
    let summary = tokio::task::spawn_blocking(move || scheduler.tick())
        .await
        .map_err(|e| AppError(anyhow::anyhow!("tick task panicked: {e}")))??;
    Ok(Json(TickResponse {
        due: summary.due,
        fired: summary.fired,
        skipped: summary.skipped,
        failed: summary.failed,
    }))
}
