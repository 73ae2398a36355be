use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::ListQuery;
use crate::db::models::{DealNoteRecord, DealRecord};
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/leads/{lead_id}/deals",
            get(list_lead_deals).post(create_deal),
        )
        .route("/deals", get(list_deals))
        .route(
            "/deals/{deal_id}",
            get(get_deal).patch(update_deal).delete(delete_deal),
        )
        .route(
            "/deals/{deal_id}/notes",
            get(list_deal_notes).post(create_deal_note),
        )
        .route("/deal-notes/{note_id}", delete(delete_deal_note))
}

#[derive(Debug, Deserialize)]
pub struct CreateDealRequest {
    pub title: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default = "default_stage")]
    pub stage: String,
    pub repo_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDealRequest {
    pub title: Option<String>,
    pub value: Option<f64>,
    pub stage: Option<String>,
    pub repo_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDealNoteRequest {
    pub content: String,
}

fn default_stage() -> String {
    "prospect".to_string()
}

async fn list_deals(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<DealRecord>>> {
    let (limit, offset) = query.normalize()?;
    let deals = queries::list_deals(&state.db, None, limit, offset).await?;
    Ok(Json(deals))
}

async fn list_lead_deals(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<DealRecord>>> {
    let (limit, offset) = query.normalize()?;
    let deals = queries::list_deals(&state.db, Some(&lead_id), limit, offset).await?;
    Ok(Json(deals))
}

async fn create_deal(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
    Json(payload): Json<CreateDealRequest>,
) -> AppResult<(StatusCode, Json<DealRecord>)> {
    let deal = queries::create_deal(
        &state.db,
        &lead_id,
        queries::NewDealInput {
            title: payload.title,
            value: payload.value,
            stage: payload.stage,
            repo_url: payload.repo_url,
            notes: payload.notes,
        },
        state.clock.now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(deal)))
}

async fn get_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> AppResult<Json<DealRecord>> {
    Ok(Json(queries::get_deal(&state.db, &deal_id).await?))
}

async fn update_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    Json(payload): Json<UpdateDealRequest>,
) -> AppResult<Json<DealRecord>> {
    if payload.title.is_none()
        && payload.value.is_none()
        && payload.stage.is_none()
        && payload.repo_url.is_none()
        && payload.notes.is_none()
    {
        return Err(AppError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let deal = queries::update_deal(
        &state.db,
        &deal_id,
        queries::UpdateDealInput {
            title: payload.title,
            value: payload.value,
            stage: payload.stage,
            repo_url: payload.repo_url,
            notes: payload.notes,
        },
        state.clock.now(),
    )
    .await?;
    Ok(Json(deal))
}

async fn delete_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> AppResult<StatusCode> {
    queries::delete_deal(&state.db, &deal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_deal_notes(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> AppResult<Json<Vec<DealNoteRecord>>> {
    Ok(Json(queries::list_deal_notes(&state.db, &deal_id).await?))
}

async fn create_deal_note(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    Json(payload): Json<CreateDealNoteRequest>,
) -> AppResult<(StatusCode, Json<DealNoteRecord>)> {
    let note =
        queries::create_deal_note(&state.db, &deal_id, &payload.content, state.clock.now()).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn delete_deal_note(
    State(state): State<AppState>,
    Path(note_id): Path<String>,
) -> AppResult<StatusCode> {
    queries::delete_deal_note(&state.db, &note_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
