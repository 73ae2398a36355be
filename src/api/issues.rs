use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::models::IssueRecord;
use crate::db::queries::{self, IssueScope};
use crate::error::{AppError, AppResult};
use crate::github;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/issues", get(list_issues))
        .route("/issues/sync", post(sync_issues))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeParams {
    pub lead_id: Option<String>,
    pub deal_id: Option<String>,
    pub projeto_id: Option<String>,
}

impl ScopeParams {
    /// At most one owner may be named.
    fn into_scope(self) -> AppResult<Option<IssueScope>> {
        let named = [
            self.lead_id.map(IssueScope::Lead),
            self.deal_id.map(IssueScope::Deal),
            self.projeto_id.map(IssueScope::Projeto),
        ];
        let mut scopes = named
            .into_iter()
            .flatten()
            .filter(|scope| !scope.id().trim().is_empty());

        let scope = scopes.next();
        if scopes.next().is_some() {
            return Err(AppError::BadRequest(
                "only one of lead_id, deal_id or projeto_id may be given".to_string(),
            ));
        }
        Ok(scope)
    }
}

#[derive(Debug, Deserialize)]
struct IssueListQuery {
    #[serde(flatten)]
    scope: ScopeParams,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SyncIssuesRequest {
    #[serde(flatten)]
    pub scope: ScopeParams,
    pub repo_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub id: String,
    pub lead_id: Option<String>,
    pub deal_id: Option<String>,
    pub projeto_id: Option<String>,
    pub gh_id: i64,
    pub title: String,
    pub state: String,
    pub url: Option<String>,
    pub data: Value,
    pub synced_at: String,
}

impl From<IssueRecord> for IssueResponse {
    fn from(issue: IssueRecord) -> Self {
        Self {
            data: serde_json::from_str(&issue.data).unwrap_or(Value::Null),
            id: issue.id,
            lead_id: issue.lead_id,
            deal_id: issue.deal_id,
            projeto_id: issue.projeto_id,
            gh_id: issue.gh_id,
            title: issue.title,
            state: issue.state,
            url: issue.url,
            synced_at: issue.synced_at,
        }
    }
}

async fn list_issues(
    State(state): State<AppState>,
    Query(query): Query<IssueListQuery>,
) -> AppResult<Json<Vec<IssueResponse>>> {
    let scope = query.scope.into_scope()?;
    let issues = queries::list_issues(&state.db, scope.as_ref(), query.state.as_deref()).await?;
    Ok(Json(issues.into_iter().map(IssueResponse::from).collect()))
}

async fn sync_issues(
    State(state): State<AppState>,
    Json(payload): Json<SyncIssuesRequest>,
) -> AppResult<Json<Vec<IssueResponse>>> {
    let scope = payload.scope.into_scope()?.ok_or_else(|| {
        AppError::BadRequest("one of lead_id, deal_id or projeto_id is required".to_string())
    })?;

    let issues = github::sync_issues(&state, scope, payload.repo_url).await?;
    Ok(Json(issues.into_iter().map(IssueResponse::from).collect()))
}
