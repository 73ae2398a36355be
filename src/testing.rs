use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::AnyPool;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::automations::clock::FixedClock;
use crate::config::{AutomationConfig, Config};
use crate::db;
use crate::state::AppState;

pub fn test_config(db_url: String) -> Config {
    Config {
        port: 0,
        db_url,
        token: None,
        log_level: "info".to_string(),
        automations: AutomationConfig::default(),
    }
}

pub async fn setup_db(name: &str) -> (TempDir, AnyPool) {
    let temp_dir = tempdir().expect("tempdir should be created");
    let db_path = temp_dir.path().join(format!("{name}.db"));
    let config = test_config(format!("sqlite://{}?mode=rwc", db_path.display()));
    let pool = db::connect_and_migrate(&config)
        .await
        .expect("database should initialize");
    (temp_dir, pool)
}

pub async fn setup_state(
    name: &str,
    now: DateTime<Utc>,
    configure: impl FnOnce(&mut Config),
) -> (TempDir, AppState, Arc<FixedClock>) {
    let (temp_dir, pool) = setup_db(name).await;
    let mut config = test_config(format!(
        "sqlite://{}?mode=rwc",
        temp_dir.path().join(format!("{name}.db")).display()
    ));
    configure(&mut config);
    let clock = Arc::new(FixedClock::new(now));
    let state = AppState::with_clock(config, pool, clock.clone()).expect("state should build");
    (temp_dir, state, clock)
}

pub async fn spawn_router(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener
        .local_addr()
        .expect("listener addr should be readable");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, handle)
}

#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    pub body: Value,
}

/// Local webhook receiver. Every request is captured. Paths starting with
/// `/fail` and messages containing `#fail` answer 500.
pub struct CaptureServer {
    addr: SocketAddr,
    receiver: mpsc::UnboundedReceiver<Captured>,
    handle: JoinHandle<()>,
}

impl CaptureServer {
    pub async fn start() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<Captured>();
        let app = Router::new().fallback(capture).with_state(sender);
        let (addr, handle) = spawn_router(app).await;
        Self {
            addr,
            receiver,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn next(&mut self) -> Option<Captured> {
        self.receiver.recv().await
    }

    pub fn drain(&mut self) -> Vec<Captured> {
        let mut captured = Vec::new();
        while let Ok(item) = self.receiver.try_recv() {
            captured.push(item);
        }
        captured
    }
}

impl Drop for CaptureServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn capture(
    State(sender): State<mpsc::UnboundedSender<Captured>>,
    uri: Uri,
    body: String,
) -> StatusCode {
    let path = uri.path().to_string();
    let body = serde_json::from_str(&body).unwrap_or(Value::String(body));
    let failing = path.starts_with("/fail")
        || body["content"]
            .as_str()
            .is_some_and(|content| content.contains("#fail"));
    let _ = sender.send(Captured { path, body });

    if failing {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}
