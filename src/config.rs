use chrono::{FixedOffset, Offset, Utc};
use clap::{Args, Parser};
use tracing::warn;

#[derive(Clone, Debug, Parser)]
#[command(name = "syncro")]
pub struct Config {
    #[arg(long, env = "SYNCRO_PORT", default_value_t = 7410)]
    pub port: u16,

    #[arg(long, env = "SYNCRO_DB_URL", default_value = "sqlite://./syncro.db")]
    pub db_url: String,

    #[arg(long, env = "SYNCRO_TOKEN")]
    pub token: Option<String>,

    #[arg(long, env = "SYNCRO_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(flatten)]
    pub automations: AutomationConfig,
}

#[derive(Clone, Debug, Args)]
pub struct AutomationConfig {
    /// Offset of the business timezone from UTC, in whole hours.
    #[arg(
        long = "utc-offset-hours",
        env = "SYNCRO_UTC_OFFSET_HOURS",
        default_value_t = -3,
        allow_hyphen_values = true
    )]
    pub utc_offset_hours: i32,

    /// Local hour at which `end_of_day` digests go out.
    #[arg(
        long = "end-of-day-hour",
        env = "SYNCRO_END_OF_DAY_HOUR",
        default_value_t = 18
    )]
    pub end_of_day_hour: u32,

    #[arg(
        long = "webhook-timeout-secs",
        env = "SYNCRO_WEBHOOK_TIMEOUT_SECS",
        default_value_t = 5
    )]
    pub webhook_timeout_secs: u64,

    /// Zero disables the in-process poller; an external scheduler is then
    /// expected to call `POST /api/v1/automations/run`.
    #[arg(
        long = "poll-interval-secs",
        env = "SYNCRO_POLL_INTERVAL_SECS",
        default_value_t = 0
    )]
    pub poll_interval_secs: u64,

    #[arg(
        long = "github-api-url",
        env = "SYNCRO_GITHUB_API_URL",
        default_value = "https://api.github.com"
    )]
    pub github_api_url: String,

    #[arg(long = "event-secret", env = "SYNCRO_EVENT_SECRET")]
    pub event_secret: Option<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: -3,
            end_of_day_hour: 18,
            webhook_timeout_secs: 5,
            poll_interval_secs: 0,
            github_api_url: "https://api.github.com".to_string(),
            event_secret: None,
        }
    }
}

impl AutomationConfig {
    pub fn business_timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn event_secret(&self) -> Option<&str> {
        self.event_secret
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

impl Config {
    pub fn from_env() -> Self {
        let config = <Self as Parser>::parse();
        config.validate();
        config
    }

    pub fn auth_enabled(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|value| !value.trim().is_empty())
    }

    pub fn log_startup_warnings(&self) {
        if !self.auth_enabled() {
            warn!("SYNCRO_TOKEN is unset, auth is disabled and all requests are allowed");
        }

        if self.automations.poll_interval_secs == 0 {
            warn!(
                "SYNCRO_POLL_INTERVAL_SECS is 0, automations only run when POST /api/v1/automations/run is called"
            );
        }

        if self.automations.event_secret().is_none() {
            warn!("SYNCRO_EVENT_SECRET is unset, lead-created events are only guarded by bearer auth");
        }
    }

    fn validate(&self) {
        assert!(
            (-12..=14).contains(&self.automations.utc_offset_hours),
            "SYNCRO_UTC_OFFSET_HOURS must be between -12 and 14"
        );
        assert!(
            self.automations.end_of_day_hour < 24,
            "SYNCRO_END_OF_DAY_HOUR must be between 0 and 23"
        );
        assert_non_zero_u64(
            "SYNCRO_WEBHOOK_TIMEOUT_SECS",
            self.automations.webhook_timeout_secs,
        );
        assert!(
            self.automations.github_api_url.starts_with("http://")
                || self.automations.github_api_url.starts_with("https://"),
            "SYNCRO_GITHUB_API_URL must be an http(s) URL"
        );
    }
}

fn assert_non_zero_u64(key: &'static str, value: u64) {
    assert!(value > 0, "{key} must be greater than 0");
}
