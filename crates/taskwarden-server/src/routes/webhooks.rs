//! Inbound change-event ingestion.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use taskwarden_core::triggers::{apply_event, normalize};

use crate::error::AppError;
use crate::state::AppState;

/// `POST /webhooks/{source}` -- normalize and apply one change event.
///
/// Returns 202 for every accepted delivery, including idempotent replays
/// (the response body says which). Malformed payloads get 400 and never
/// touch the trigger store.
pub async fn ingest(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let event = normalize(&source, &payload).map_err(|e| {
        tracing::warn!(source = %source, error = %e, payload = %payload, "rejected webhook payload");
        AppError(e.into())
    })?;

    let outcome = apply_event(state.scheduler.store(), &event, state.scheduler.now())?;
    tracing::info!(
        source = %source,
        event = %event.external_id,
        item = %event.item_ref,
        outcome = ?outcome,
        "webhook accepted"
    );
    Ok((StatusCode::ACCEPTED, Json(serde_json::to_value(&outcome)?)))
}
