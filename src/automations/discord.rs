use anyhow::{anyhow, Context};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct DiscordMessage<'a> {
    content: &'a str,
}

/// Posts `content` to a Discord-compatible incoming webhook.
///
/// Transport failures and non-2xx responses are errors. Nothing is retried.
/// The webhook URL embeds its own credential, so it never appears in errors.
pub async fn send_message(
    client: &reqwest::Client,
    webhook_url: &str,
    content: &str,
) -> anyhow::Result<()> {
    let response = client
        .post(webhook_url)
        .json(&DiscordMessage { content })
        .send()
        .await
        .context("webhook request failed")?;

    if response.status().is_success() {
        return Ok(());
    }

    Err(anyhow!("webhook returned status {}", response.status()))
}
