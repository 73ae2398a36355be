use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ListQuery;
use crate::automations::template::unknown_placeholders;
use crate::automations::trigger::TriggerKind;
use crate::automations::{self, RunSummary};
use crate::db::models::{AutomationLogRecord, AutomationRecord};
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/automations", get(list_automations).post(create_automation))
        .route("/automations/run", post(run_automations))
        .route(
            "/automations/{automation_id}",
            get(get_automation)
                .patch(update_automation)
                .delete(delete_automation),
        )
        .route("/automations/{automation_id}/logs", get(list_logs))
        .route("/automations/{automation_id}/test", post(test_automation))
}

#[derive(Debug, Deserialize)]
pub struct CreateAutomationRequest {
    pub name: String,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_value: Value,
    pub webhook_url: String,
    pub message_template: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAutomationRequest {
    pub name: Option<String>,
    pub trigger_type: Option<String>,
    pub trigger_value: Option<Value>,
    pub webhook_url: Option<String>,
    pub message_template: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AutomationResponse {
    pub id: String,
    pub name: String,
    pub trigger_type: String,
    pub trigger_value: Value,
    pub webhook_url: String,
    pub message_template: String,
    pub active: bool,
    pub last_fired_at: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_warnings: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct AutomationLogResponse {
    pub id: String,
    pub automation_id: String,
    pub entity_id: Option<String>,
    pub fired_at: String,
    pub success: bool,
    pub payload: Value,
}

fn default_active() -> bool {
    true
}

fn map_automation(record: AutomationRecord) -> AutomationResponse {
    let trigger_value = serde_json::from_str(&record.trigger_value)
        .unwrap_or_else(|_| Value::String(record.trigger_value.clone()));

    AutomationResponse {
        id: record.id,
        name: record.name,
        trigger_type: record.trigger_type,
        trigger_value,
        webhook_url: record.webhook_url,
        message_template: record.message_template,
        active: record.active != 0,
        last_fired_at: record.last_fired_at,
        created_at: record.created_at,
        template_warnings: None,
    }
}

/// Saving never fails on unknown placeholders; they are reported instead.
fn with_template_warnings(record: AutomationRecord) -> AutomationResponse {
    let warnings = TriggerKind::parse(&record.trigger_type)
        .map(|kind| unknown_placeholders(&record.message_template, kind))
        .unwrap_or_default();

    AutomationResponse {
        template_warnings: Some(warnings),
        ..map_automation(record)
    }
}

fn map_log(record: AutomationLogRecord) -> AutomationLogResponse {
    let payload = serde_json::from_str(&record.payload)
        .unwrap_or_else(|_| Value::String(record.payload.clone()));

    AutomationLogResponse {
        id: record.id,
        automation_id: record.automation_id,
        entity_id: record.entity_id,
        fired_at: record.fired_at,
        success: record.success != 0,
        payload,
    }
}

async fn list_automations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<AutomationResponse>>> {
    let (limit, offset) = query.normalize()?;
    let automations = queries::list_automations(&state.db, limit, offset).await?;
    Ok(Json(automations.into_iter().map(map_automation).collect()))
}

async fn create_automation(
    State(state): State<AppState>,
    Json(payload): Json<CreateAutomationRequest>,
) -> AppResult<(StatusCode, Json<AutomationResponse>)> {
    let automation = queries::create_automation(
        &state.db,
        queries::CreateAutomationInput {
            name: payload.name,
            trigger_type: payload.trigger_type,
            trigger_value: payload.trigger_value,
            webhook_url: payload.webhook_url,
            message_template: payload.message_template,
            active: payload.active,
        },
        state.clock.now(),
    )
    .await?;

    tracing::info!(automation_id = %automation.id, trigger = %automation.trigger_type, "automation created");
    Ok((StatusCode::CREATED, Json(with_template_warnings(automation))))
}

async fn get_automation(
    State(state): State<AppState>,
    Path(automation_id): Path<String>,
) -> AppResult<Json<AutomationResponse>> {
    let automation = queries::get_automation(&state.db, &automation_id).await?;
    Ok(Json(map_automation(automation)))
}

async fn update_automation(
    State(state): State<AppState>,
    Path(automation_id): Path<String>,
    Json(payload): Json<UpdateAutomationRequest>,
) -> AppResult<Json<AutomationResponse>> {
    if payload.name.is_none()
        && payload.trigger_type.is_none()
        && payload.trigger_value.is_none()
        && payload.webhook_url.is_none()
        && payload.message_template.is_none()
        && payload.active.is_none()
    {
        return Err(AppError::BadRequest(
            "at least one field must be provided".to_string(),
        ));
    }

    let automation = queries::update_automation(
        &state.db,
        &automation_id,
        queries::UpdateAutomationInput {
            name: payload.name,
            trigger_type: payload.trigger_type,
            trigger_value: payload.trigger_value,
            webhook_url: payload.webhook_url,
            message_template: payload.message_template,
            active: payload.active,
        },
    )
    .await?;
    Ok(Json(with_template_warnings(automation)))
}

async fn delete_automation(
    State(state): State<AppState>,
    Path(automation_id): Path<String>,
) -> AppResult<StatusCode> {
    queries::delete_automation(&state.db, &automation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_logs(
    State(state): State<AppState>,
    Path(automation_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<AutomationLogResponse>>> {
    let (limit, offset) = query.normalize()?;
    let logs = queries::list_automation_logs(&state.db, &automation_id, limit, offset).await?;
    Ok(Json(logs.into_iter().map(map_log).collect()))
}

async fn test_automation(
    State(state): State<AppState>,
    Path(automation_id): Path<String>,
) -> AppResult<StatusCode> {
    automations::send_test(&state, &automation_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Entry point for an external scheduler. Per-automation failures land in
/// the log; the response only reports counts.
async fn run_automations(State(state): State<AppState>) -> AppResult<Json<RunSummary>> {
    let summary = automations::run_scheduled(&state, state.clock.now()).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};
    use tokio::time::timeout;

    use crate::api::app;
    use crate::testing::{setup_state, CaptureServer};

    #[tokio::test]
    async fn create_reports_template_warnings_and_defaults() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).single().expect("instant");
        let (_temp_dir, state, _clock) = setup_state("automation-api", now, |_| {}).await;
        let server = TestServer::new(app(state)).expect("test server should start");

        let created = server
            .post("/api/v1/automations")
            .json(&json!({
                "name": "parado",
                "trigger_type": "no_progress",
                "webhook_url": "https://discord.test/api/webhooks/1/abc",
                "message_template": "{{projeto.nome}} parado"
            }))
            .await;
        created.assert_status(StatusCode::CREATED);
        let body: Value = created.json();
        assert_eq!(body["trigger_value"], json!({ "days": 7 }));
        assert_eq!(body["active"], true);
        assert_eq!(body["template_warnings"], json!(["projeto.nome"]));

        let automation_id = body["id"].as_str().expect("automation id");
        let fetched: Value = server
            .get(&format!("/api/v1/automations/{automation_id}"))
            .await
            .json();
        assert!(fetched.get("template_warnings").is_none());

        let defaulted: Value = server
            .post("/api/v1/automations")
            .json(&json!({
                "name": "resumo",
                "trigger_type": "end_of_day",
                "webhook_url": "https://discord.test/api/webhooks/1/abc"
            }))
            .await
            .json();
        assert!(defaulted["message_template"]
            .as_str()
            .is_some_and(|template| template.contains("{{stats.tasks_done}}")));
        assert_eq!(defaulted["template_warnings"], json!([]));
    }

    #[tokio::test]
    async fn invalid_triggers_are_rejected_on_save() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).single().expect("instant");
        let (_temp_dir, state, _clock) = setup_state("automation-api-invalid", now, |_| {}).await;
        let server = TestServer::new(app(state)).expect("test server should start");

        for body in [
            json!({ "name": "x", "trigger_type": "weekly", "webhook_url": "https://d.test/h" }),
            json!({ "name": "x", "trigger_type": "no_progress", "trigger_value": { "days": 0 }, "webhook_url": "https://d.test/h" }),
            json!({ "name": "x", "trigger_type": "no_progress", "trigger_value": "7", "webhook_url": "https://d.test/h" }),
            json!({ "name": "x", "trigger_type": "end_of_day", "webhook_url": "not a url" }),
        ] {
            server
                .post("/api/v1/automations")
                .json(&body)
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_endpoint_sends_sample_without_logging() {
        let mut capture = CaptureServer::start().await;
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).single().expect("instant");
        let (_temp_dir, state, _clock) = setup_state("automation-api-test", now, |_| {}).await;
        let server = TestServer::new(app(state)).expect("test server should start");

        let created: Value = server
            .post("/api/v1/automations")
            .json(&json!({
                "name": "prazo",
                "trigger_type": "deadline_approaching",
                "webhook_url": capture.url("/hook"),
                "message_template": "{{lead.name}} até {{lead.deadline}}"
            }))
            .await
            .json();
        let automation_id = created["id"].as_str().expect("automation id");

        server
            .post(&format!("/api/v1/automations/{automation_id}/test"))
            .await
            .assert_status(StatusCode::ACCEPTED);

        let captured = timeout(Duration::from_secs(3), capture.next())
            .await
            .expect("capture should arrive before timeout")
            .expect("capture channel should include payload");
        assert_eq!(
            captured.body,
            json!({ "content": "Lead de exemplo até 11/05/2026" })
        );

        let logs: Value = server
            .get(&format!("/api/v1/automations/{automation_id}/logs"))
            .await
            .json();
        assert_eq!(logs, json!([]));
        let fetched: Value = server
            .get(&format!("/api/v1/automations/{automation_id}"))
            .await
            .json();
        assert_eq!(fetched["last_fired_at"], Value::Null);
    }

    #[tokio::test]
    async fn test_endpoint_reports_upstream_failure() {
        let capture = CaptureServer::start().await;
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).single().expect("instant");
        let (_temp_dir, state, _clock) = setup_state("automation-api-fail", now, |_| {}).await;
        let server = TestServer::new(app(state)).expect("test server should start");

        let created: Value = server
            .post("/api/v1/automations")
            .json(&json!({
                "name": "resumo",
                "trigger_type": "end_of_day",
                "webhook_url": capture.url("/fail")
            }))
            .await
            .json();
        let automation_id = created["id"].as_str().expect("automation id");

        server
            .post(&format!("/api/v1/automations/{automation_id}/test"))
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn run_endpoint_returns_summary_and_logs_firings() {
        let mut capture = CaptureServer::start().await;
        // 18:05 local.
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 21, 5, 0).single().expect("instant");
        let (_temp_dir, state, _clock) = setup_state("automation-api-run", now, |_| {}).await;
        let server = TestServer::new(app(state)).expect("test server should start");

        let created: Value = server
            .post("/api/v1/automations")
            .json(&json!({
                "name": "resumo",
                "trigger_type": "end_of_day",
                "webhook_url": capture.url("/digest"),
                "message_template": "feitas={{stats.tasks_done}}"
            }))
            .await
            .json();
        let automation_id = created["id"].as_str().expect("automation id");

        let first: Value = server.post("/api/v1/automations/run").await.json();
        let second: Value = server.post("/api/v1/automations/run").await.json();
        assert_eq!(first, json!({ "evaluated": 1, "sent": 1, "skipped": 0, "failed": 0 }));
        assert_eq!(second, json!({ "evaluated": 1, "sent": 0, "skipped": 1, "failed": 0 }));

        assert_eq!(capture.drain().len(), 1);
        let logs: Value = server
            .get(&format!("/api/v1/automations/{automation_id}/logs"))
            .await
            .json();
        assert_eq!(logs[0]["success"], true);
        assert_eq!(logs[0]["payload"]["digest"], "2026-05-10");

        let fetched: Value = server
            .get(&format!("/api/v1/automations/{automation_id}"))
            .await
            .json();
        assert_eq!(fetched["last_fired_at"], "2026-05-10T21:05:00Z");
    }

    #[tokio::test]
    async fn run_endpoint_follows_the_clock_across_days() {
        let mut capture = CaptureServer::start().await;
        let start = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).single().expect("instant");
        let (_temp_dir, state, clock) = setup_state("automation-api-days", start, |_| {}).await;
        let server = TestServer::new(app(state)).expect("test server should start");

        let projeto: Value = server
            .post("/api/v1/projetos")
            .json(&json!({ "name": "Site", "status": "dev", "progress": 40 }))
            .await
            .json();
        assert_eq!(projeto["updated_at"], "2026-05-10T12:00:00Z");

        server
            .post("/api/v1/automations")
            .json(&json!({
                "name": "parado",
                "trigger_type": "no_progress",
                "trigger_value": { "days": 3 },
                "webhook_url": capture.url("/stale"),
                "message_template": "{{projeto.name}} desde {{projeto.updated_at}}"
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let fresh: Value = server.post("/api/v1/automations/run").await.json();
        assert_eq!(fresh["sent"], 0);

        clock.set(Utc.with_ymd_and_hms(2026, 5, 14, 12, 0, 0).single().expect("instant"));
        let stale: Value = server.post("/api/v1/automations/run").await.json();
        let repeat: Value = server.post("/api/v1/automations/run").await.json();
        assert_eq!(stale["sent"], 1);
        assert_eq!(repeat["skipped"], 1);

        // 00:30 local on the 15th.
        clock.set(Utc.with_ymd_and_hms(2026, 5, 15, 3, 30, 0).single().expect("instant"));
        let next_day: Value = server.post("/api/v1/automations/run").await.json();
        assert_eq!(next_day["sent"], 1);

        let messages: Vec<Value> = capture.drain().into_iter().map(|c| c.body).collect();
        assert_eq!(
            messages,
            vec![
                json!({ "content": "Site desde 10/05/2026" }),
                json!({ "content": "Site desde 10/05/2026" }),
            ]
        );
    }
}
