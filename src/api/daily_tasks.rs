use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::automations::clock::local_date;
use crate::db::models::DailyTaskRecord;
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::workday;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/daily-tasks", get(list_daily_tasks).post(create_daily_task))
        .route("/daily-tasks/materialize", post(materialize_daily_tasks))
        .route(
            "/daily-tasks/{task_id}",
            patch(update_daily_task).delete(delete_daily_task),
        )
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDailyTaskRequest {
    pub title: String,
    pub notes: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: String,
    pub scheduled_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDailyTaskRequest {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub done: Option<bool>,
    pub priority: Option<String>,
    pub scheduled_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DailyTaskResponse {
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub done: bool,
    pub priority: String,
    pub source: String,
    pub source_id: Option<String>,
    pub scheduled_date: String,
    pub created_at: String,
}

impl From<DailyTaskRecord> for DailyTaskResponse {
    fn from(task: DailyTaskRecord) -> Self {
        Self {
            id: task.id,
            title: task.title,
            notes: task.notes,
            done: task.done != 0,
            priority: task.priority,
            source: task.source,
            source_id: task.source_id,
            scheduled_date: task.scheduled_date,
            created_at: task.created_at,
        }
    }
}

fn default_priority() -> String {
    "backlog".to_string()
}

async fn list_daily_tasks(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> AppResult<Json<Vec<DailyTaskResponse>>> {
    let date = resolve_date(&state, query.date.as_deref())?;
    let tasks = queries::list_daily_tasks(&state.db, &date.to_string()).await?;
    Ok(Json(tasks.into_iter().map(DailyTaskResponse::from).collect()))
}

async fn create_daily_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateDailyTaskRequest>,
) -> AppResult<(StatusCode, Json<DailyTaskResponse>)> {
    let scheduled_date = resolve_date(&state, payload.scheduled_date.as_deref())?;
    let task = queries::create_daily_task(
        &state.db,
        queries::NewDailyTaskInput {
            title: payload.title,
            notes: payload.notes,
            priority: payload.priority,
            source: "manual".to_string(),
            source_id: None,
            scheduled_date: scheduled_date.to_string(),
        },
        state.clock.now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(DailyTaskResponse::from(task))))
}

async fn update_daily_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(payload): Json<UpdateDailyTaskRequest>,
) -> AppResult<Json<DailyTaskResponse>> {
    if payload.title.is_none()
        && payload.notes.is_none()
        && payload.done.is_none()
        && payload.priority.is_none()
        && payload.scheduled_date.is_none()
    {
        return Err(AppError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let task = queries::update_daily_task(
        &state.db,
        &task_id,
        queries::UpdateDailyTaskInput {
            title: payload.title,
            notes: payload.notes,
            done: payload.done,
            priority: payload.priority,
            scheduled_date: payload.scheduled_date,
        },
    )
    .await?;
    Ok(Json(DailyTaskResponse::from(task)))
}

async fn delete_daily_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<StatusCode> {
    queries::delete_daily_task(&state.db, &task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn materialize_daily_tasks(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> AppResult<(StatusCode, Json<Vec<DailyTaskResponse>>)> {
    let date = resolve_date(&state, query.date.as_deref())?;
    let created = workday::materialize(&state, Some(date)).await?;
    Ok((
        StatusCode::CREATED,
        Json(created.into_iter().map(DailyTaskResponse::from).collect()),
    ))
}

/// Parses `YYYY-MM-DD`, falling back to the business-local today.
fn resolve_date(state: &AppState, raw: Option<&str>) -> AppResult<NaiveDate> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest("date must be a YYYY-MM-DD date".to_string())),
        None => Ok(local_date(state.clock.now(), state.business_timezone())),
    }
}
