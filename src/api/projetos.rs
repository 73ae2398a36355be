use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::ListQuery;
use crate::db::models::ProjetoRecord;
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projetos", get(list_projetos).post(create_projeto))
        .route(
            "/projetos/{projeto_id}",
            get(get_projeto).patch(update_projeto).delete(delete_projeto),
        )
}

#[derive(Debug, Deserialize)]
struct ProjetoListQuery {
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjetoRequest {
    pub lead_id: Option<String>,
    pub name: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub progress: i64,
    pub notes: Option<String>,
    pub repo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjetoRequest {
    pub lead_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub progress: Option<i64>,
    pub notes: Option<String>,
    pub repo_url: Option<String>,
}

fn default_status() -> String {
    "idea".to_string()
}

async fn list_projetos(
    State(state): State<AppState>,
    Query(query): Query<ProjetoListQuery>,
) -> AppResult<Json<Vec<ProjetoRecord>>> {
    let (limit, offset) = ListQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .normalize()?;
    let projetos =
        queries::list_projetos(&state.db, query.status.as_deref(), limit, offset).await?;
    Ok(Json(projetos))
}

async fn create_projeto(
    State(state): State<AppState>,
    Json(payload): Json<CreateProjetoRequest>,
) -> AppResult<(StatusCode, Json<ProjetoRecord>)> {
    let projeto = queries::create_projeto(
        &state.db,
        queries::NewProjetoInput {
            lead_id: payload.lead_id,
            name: payload.name,
            status: payload.status,
            progress: payload.progress,
            notes: payload.notes,
            repo_url: payload.repo_url,
        },
        state.clock.now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(projeto)))
}

async fn get_projeto(
    State(state): State<AppState>,
    Path(projeto_id): Path<String>,
) -> AppResult<Json<ProjetoRecord>> {
    Ok(Json(queries::get_projeto(&state.db, &projeto_id).await?))
}

async fn update_projeto(
    State(state): State<AppState>,
    Path(projeto_id): Path<String>,
    Json(payload): Json<UpdateProjetoRequest>,
) -> AppResult<Json<ProjetoRecord>> {
    if payload.lead_id.is_none()
        && payload.name.is_none()
        && payload.status.is_none()
        && payload.progress.is_none()
        && payload.notes.is_none()
        && payload.repo_url.is_none()
    {
        return Err(AppError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let projeto = queries::update_projeto(
        &state.db,
        &projeto_id,
        queries::UpdateProjetoInput {
            lead_id: payload.lead_id,
            name: payload.name,
            status: payload.status,
            progress: payload.progress,
            notes: payload.notes,
            repo_url: payload.repo_url,
        },
        state.clock.now(),
    )
    .await?;
    Ok(Json(projeto))
}

async fn delete_projeto(
    State(state): State<AppState>,
    Path(projeto_id): Path<String>,
) -> AppResult<StatusCode> {
    queries::delete_projeto(&state.db, &projeto_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
