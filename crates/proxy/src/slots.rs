//! Persisted slot management handlers. Secrets are never returned in full.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use yoso_types::{CredentialSlot, FailureClass, SlotId, Timestamp};

use crate::{ApiError, AppState};

/// Public view of one slot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub id: SlotId,
    pub label: String,
    pub masked_secret: String,
    pub configured: bool,
    pub ready: bool,
    pub cooldown_until: Option<Timestamp>,
    pub last_used_at: Option<Timestamp>,
    pub last_error: Option<FailureClass>,
}

impl SlotView {
    #[must_use]
    pub fn new(slot: &CredentialSlot, now: Timestamp) -> Self {
        Self {
            id: slot.id,
            label: slot.label.clone(),
            masked_secret: slot.masked_secret(),
            configured: slot.is_configured(),
            ready: slot.is_ready(now),
            cooldown_until: slot.cooldown_until.filter(|&t| t > now),
            last_used_at: slot.last_used_at,
            last_error: slot.last_error,
        }
    }
}

fn views(slots: &[CredentialSlot], now: Timestamp) -> Vec<SlotView> {
    slots.iter().map(|s| SlotView::new(s, now)).collect()
}

/// Handles `GET /api/slots`.
pub async fn list_slots(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let slots = state.slots.load().await?;
    let now = state.clock.now_ms();
    Ok(Json(json!({ "ok": true, "slots": views(&slots, now) })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSlotBody {
    pub label: Option<String>,
    pub secret: Option<String>,
}

/// Handles `PUT /api/slots/{id}`.
pub async fn update_slot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    Json(body): Json<UpdateSlotBody>,
) -> Result<Response, ApiError> {
    let Some(slot) = state
        .slots
        .update(SlotId(id), body.label, body.secret)
        .await?
    else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": "SLOT_NOT_FOUND" })),
        )
            .into_response());
    };
    tracing::info!(slot = %slot.id, configured = slot.is_configured(), "slot updated");
    let now = state.clock.now_ms();
    Ok(Json(json!({ "ok": true, "slot": SlotView::new(&slot, now) })).into_response())
}

/// Handles `DELETE /api/slots`.
pub async fn clear_slots(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let slots = state.slots.clear().await?;
    let now = state.clock.now_ms();
    Ok(Json(json!({ "ok": true, "slots": views(&slots, now) })))
}
