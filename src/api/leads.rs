use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::ListQuery;
use crate::automations::{self, evaluate::LeadEvent};
use crate::db::models::LeadRecord;
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/leads", get(list_leads).post(create_lead))
        .route(
            "/leads/{lead_id}",
            get(get_lead).patch(update_lead).delete(delete_lead),
        )
}

#[derive(Debug, Deserialize)]
struct LeadListQuery {
    status: Option<String>,
    #[serde(default)]
    include_archived: bool,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub company: Option<String>,
    pub contact: Option<String>,
    pub repo_url: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    pub deadline: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    pub name: Option<String>,
    pub company: Option<String>,
    pub contact: Option<String>,
    pub repo_url: Option<String>,
    pub status: Option<String>,
    pub deadline: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub archived: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub id: String,
    pub name: String,
    pub company: Option<String>,
    pub contact: Option<String>,
    pub repo_url: Option<String>,
    pub status: String,
    pub deadline: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<LeadRecord> for LeadResponse {
    fn from(lead: LeadRecord) -> Self {
        Self {
            tags: queries::parse_tags(&lead.tags),
            archived: lead.archived != 0,
            id: lead.id,
            name: lead.name,
            company: lead.company,
            contact: lead.contact,
            repo_url: lead.repo_url,
            status: lead.status,
            deadline: lead.deadline,
            notes: lead.notes,
            created_at: lead.created_at,
            updated_at: lead.updated_at,
        }
    }
}

fn default_status() -> String {
    "new".to_string()
}

async fn list_leads(
    State(state): State<AppState>,
    Query(query): Query<LeadListQuery>,
) -> AppResult<Json<Vec<LeadResponse>>> {
    let (limit, offset) = ListQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .normalize()?;
    let filters = queries::LeadFilters {
        status: query.status,
        include_archived: query.include_archived,
    };

    let leads = queries::list_leads(&state.db, filters, limit, offset).await?;
    Ok(Json(leads.into_iter().map(LeadResponse::from).collect()))
}

async fn create_lead(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeadRequest>,
) -> AppResult<(StatusCode, Json<LeadResponse>)> {
    let lead = queries::create_lead(
        &state.db,
        queries::NewLeadInput {
            name: payload.name,
            company: payload.company,
            contact: payload.contact,
            repo_url: payload.repo_url,
            status: payload.status,
            deadline: payload.deadline,
            notes: payload.notes,
            tags: payload.tags,
        },
        state.clock.now(),
    )
    .await?;

    automations::spawn_new_lead(state.clone(), LeadEvent::from(&lead));
    Ok((StatusCode::CREATED, Json(LeadResponse::from(lead))))
}

async fn get_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
) -> AppResult<Json<LeadResponse>> {
    let lead = queries::get_lead(&state.db, &lead_id).await?;
    Ok(Json(LeadResponse::from(lead)))
}

async fn update_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
    Json(payload): Json<UpdateLeadRequest>,
) -> AppResult<Json<LeadResponse>> {
    let input = queries::UpdateLeadInput {
        name: payload.name,
        company: payload.company,
        contact: payload.contact,
        repo_url: payload.repo_url,
        status: payload.status,
        deadline: payload.deadline,
        notes: payload.notes,
        tags: payload.tags,
        archived: payload.archived,
    };

    if is_empty_update(&input) {
        return Err(AppError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let lead = queries::update_lead(&state.db, &lead_id, input, state.clock.now()).await?;
    Ok(Json(LeadResponse::from(lead)))
}

async fn delete_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
) -> AppResult<StatusCode> {
    queries::delete_lead(&state.db, &lead_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn is_empty_update(input: &queries::UpdateLeadInput) -> bool {
    input.name.is_none()
        && input.company.is_none()
        && input.contact.is_none()
        && input.repo_url.is_none()
        && input.status.is_none()
        && input.deadline.is_none()
        && input.notes.is_none()
        && input.tags.is_none()
        && input.archived.is_none()
}
