use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::auth;
use crate::automations::evaluate::LeadEvent;
use crate::automations::{self, RunSummary};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events/lead-created", post(lead_created))
}

/// Row-change notification shape: `{ "record": { ... } }`.
#[derive(Debug, Deserialize)]
struct RowEvent {
    record: Option<LeadEvent>,
}

async fn lead_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<RunSummary>> {
    if let Some(secret) = state.config.automations.event_secret() {
        auth::verify_event_signature(secret, &headers, &body)?;
    }

    let event: RowEvent = serde_json::from_slice(&body)
        .map_err(|error| AppError::BadRequest(format!("invalid event body: {error}")))?;
    let lead = event
        .record
        .ok_or_else(|| AppError::BadRequest("event has no record".to_string()))?;

    let summary = automations::handle_new_lead(&state, &lead, state.clock.now()).await?;
    Ok(Json(summary))
}
