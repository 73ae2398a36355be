use anyhow::{anyhow, Context};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::automations::clock::timestamp;
use crate::db::models::IssueRecord;
use crate::db::queries::{self, IssueScope, NewIssueInput};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const ISSUES_PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct GithubIssue {
    number: i64,
    title: String,
    state: String,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    labels: Value,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<GithubIssue> for NewIssueInput {
    fn from(issue: GithubIssue) -> Self {
        Self {
            gh_id: issue.number,
            title: issue.title,
            state: issue.state,
            url: issue.html_url,
            data: json!({
                "labels": issue.labels,
                "body": issue.body,
                "created_at": issue.created_at,
            }),
        }
    }
}

/// Replaces the stored issues of `scope` with the repository's current
/// issue list. Without an explicit `repo_url`, the owning row's is used.
pub async fn sync_issues(
    state: &AppState,
    scope: IssueScope,
    repo_url: Option<String>,
) -> AppResult<Vec<IssueRecord>> {
    let owner_repo_url = match &scope {
        IssueScope::Lead(id) => queries::get_lead(&state.db, id).await?.repo_url,
        IssueScope::Deal(id) => queries::get_deal(&state.db, id).await?.repo_url,
        IssueScope::Projeto(id) => queries::get_projeto(&state.db, id).await?.repo_url,
    };

    let repo_url = repo_url
        .filter(|value| !value.trim().is_empty())
        .or(owner_repo_url)
        .ok_or_else(|| AppError::BadRequest("no repo_url given and none stored".to_string()))?;
    let repo_path = extract_repo_path(&repo_url)
        .ok_or_else(|| AppError::BadRequest(format!("invalid repository url '{repo_url}'")))?;

    let issues = fetch_issues(
        &state.http,
        &state.config.automations.github_api_url,
        &repo_path,
    )
    .await
    .map_err(|error| {
        tracing::warn!(error = ?error, repo = %repo_path, "issue sync failed upstream");
        AppError::Upstream(format!("{error:#}"))
    })?;

    let synced = queries::replace_issues(
        &state.db,
        &scope,
        issues,
        &timestamp(state.clock.now()),
    )
    .await?;

    tracing::info!(repo = %repo_path, count = synced.len(), "issues synced");
    Ok(synced)
}

async fn fetch_issues(
    client: &reqwest::Client,
    api_url: &str,
    repo_path: &str,
) -> anyhow::Result<Vec<NewIssueInput>> {
    let url = format!(
        "{}/repos/{repo_path}/issues?state=all&per_page={ISSUES_PER_PAGE}",
        api_url.trim_end_matches('/')
    );

    let response = client
        .get(&url)
        .header(ACCEPT, "application/vnd.github+json")
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("issue API returned status {status}"));
    }

    let issues: Vec<GithubIssue> = response
        .json()
        .await
        .context("issue API returned an unexpected body")?;

    Ok(issues.into_iter().map(NewIssueInput::from).collect())
}

/// `owner/name` from a repository URL, a scheme-less URL or a bare path.
pub fn extract_repo_path(repo_url: &str) -> Option<String> {
    let trimmed = repo_url.trim();
    let with_scheme = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    if let Ok(url) = Url::parse(&with_scheme) {
        let parts: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|part| !part.is_empty()).collect())
            .unwrap_or_default();
        if let [owner, name, ..] = parts.as_slice() {
            return Some(join_repo_path(owner, name));
        }
    }

    let parts: Vec<&str> = trimmed.split('/').filter(|part| !part.is_empty()).collect();
    match parts.as_slice() {
        [.., owner, name] => Some(join_repo_path(owner, name)),
        _ => None,
    }
}

fn join_repo_path(owner: &str, name: &str) -> String {
    format!("{owner}/{}", name.trim_end_matches(".git"))
}
