pub mod auth;
pub mod automations;
pub mod daily_tasks;
pub mod deals;
pub mod events;
pub mod issues;
pub mod leads;
pub mod projetos;

use axum::http::{header, Method};
use axum::middleware;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(leads::router())
        .merge(deals::router())
        .merge(projetos::router())
        .merge(daily_tasks::router())
        .merge(automations::router())
        .merge(issues::router())
        .merge(events::router())
}

/// The full HTTP surface: `/api/v1`, `/healthz`, auth, CORS and tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .nest("/api/v1", router())
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthzResponse {
    pub status: &'static str,
}

pub async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn normalize(&self) -> AppResult<(i64, i64)> {
        let limit = self.limit.unwrap_or(50);
        let offset = self.offset.unwrap_or(0);

        if !(1..=100).contains(&limit) {
            return Err(AppError::BadRequest(
                "limit must be between 1 and 100".to_string(),
            ));
        }

        if offset < 0 {
            return Err(AppError::BadRequest(
                "offset cannot be negative".to_string(),
            ));
        }

        Ok((limit, offset))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    use super::{app, ListQuery};
    use crate::testing::setup_state;

    #[test]
    fn list_query_bounds() {
        let query = |limit, offset| ListQuery { limit, offset }.normalize();
        assert_eq!(query(None, None).expect("defaults"), (50, 0));
        assert!(query(Some(0), None).is_err());
        assert!(query(Some(101), None).is_err());
        assert!(query(Some(10), Some(-1)).is_err());
    }

    #[tokio::test]
    async fn bearer_token_guards_api_but_not_healthz() {
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).single().expect("instant");
        let (_temp_dir, state, _clock) = setup_state("auth", now, |config| {
            config.token = Some("letmein".to_string());
        })
        .await;
        let server = TestServer::new(app(state)).expect("test server should start");

        server.get("/healthz").await.assert_status_ok();
        server
            .get("/api/v1/leads")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let authorized = server
            .get("/api/v1/leads")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_static("Bearer letmein"),
            )
            .await;
        authorized.assert_status_ok();
        assert_eq!(authorized.json::<Value>(), Value::Array(Vec::new()));
    }
}
