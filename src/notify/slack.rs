use anyhow::{Context, Result};
use reqwest::Client;

use super::{AlertEvent, Notifier};

pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: Client,
}

impl SlackNotifier {
    pub fn from_env() -> Self {
        Self {
            webhook_url: std::env::var("SLACK_WEBHOOK_URL").ok(),
            client: Client::new(),
        }
    }

    /// Optional builder for tests/tools
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: Some(url),
            client: Client::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.webhook_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, ev: &AlertEvent) -> Result<()> {
        let Some(url) = self.webhook_url.as_deref().filter(|u| !u.is_empty()) else {
            tracing::debug!("Slack disabled (no SLACK_WEBHOOK_URL)");
            return Ok(());
        };

        let text = format!(
            "*Ingest alert:* *{}*\n{}\n@ {}",
            ev.source,
            ev.message,
            ev.ts.to_rfc3339()
        );
        let body = serde_json::json!({ "text": text });

        self.client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
