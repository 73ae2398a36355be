use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::FixedOffset;
use sqlx::AnyPool;

use crate::automations::clock::{Clock, SystemClock};
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: AnyPool,
    pub http: reqwest::Client,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config, db: AnyPool) -> anyhow::Result<Self> {
        Self::with_clock(config, db, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, db: AnyPool, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.automations.webhook_timeout_secs))
            .user_agent(concat!("syncro/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build outbound http client")?;

        Ok(Self {
            config: Arc::new(config),
            db,
            http,
            clock,
        })
    }

    pub fn business_timezone(&self) -> FixedOffset {
        self.config.automations.business_timezone()
    }
}
