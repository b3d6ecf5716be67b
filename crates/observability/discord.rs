use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use url::Url;

use super::alert_layer::{Alert, AlertSink};

const DISCORD_CONTENT_LIMIT: usize = 2000;

pub(crate) struct DiscordAlertSink {
    webhook_url: Url,
    client: Client,
}

impl DiscordAlertSink {
    pub(crate) fn new(webhook_url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .context("failed to build discord http client")?;

        Ok(Self {
            webhook_url,
            client,
        })
    }
}

pub(crate) fn render(alert: &Alert) -> String {
    let mut lines = vec![format!(
        "**{}** `{}` `{}` `{}`",
        alert.service.service_name,
        alert.service.environment,
        alert.service.component,
        alert.level.as_str()
    )];

    let location = alert
        .location
        .as_deref()
        .map(|loc| format!(" `{loc}`"))
        .unwrap_or_default();
    lines.push(format!(
        "`{}` `{}`{}",
        alert.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        alert.target,
        location
    ));

    if let Some(message) = alert.message.as_deref().filter(|m| !m.trim().is_empty()) {
        lines.push(format!("> {}", message.trim()));
    }

    lines.extend(alert.fields.iter().map(|(k, v)| format!("- `{k}` = `{v}`")));

    truncate(lines.join("\n"))
}

fn truncate(content: String) -> String {
    const SUFFIX: &str = "\n… (truncated)";

    if content.chars().count() <= DISCORD_CONTENT_LIMIT {
        return content;
    }

    let keep = DISCORD_CONTENT_LIMIT - SUFFIX.chars().count();
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(SUFFIX);
    truncated
}

#[async_trait]
impl AlertSink for DiscordAlertSink {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&json!({ "content": render(alert) }))
            .send()
            .await
            // reqwest errors include the URL, which carries the webhook token.
            .map_err(|err| anyhow!("discord webhook request failed (timeout: {})", err.is_timeout()))?;

        if !response.status().is_success() {
            return Err(anyhow!("discord webhook returned {}", response.status()));
        }

        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::config::ServiceContext;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tracing::Level;

    fn alert(message: &str) -> Alert {
        Alert {
            level: Level::ERROR,
            timestamp: Utc::now(),
            service: ServiceContext {
                service_name: "pos-license".to_string(),
                environment: "production".to_string(),
                component: "backend".to_string(),
            },
            target: "backend::usecases::event_ingestion".to_string(),
            location: Some("event_ingestion.rs:42".to_string()),
            message: Some(message.to_string()),
            fields: BTreeMap::from([("event_id".to_string(), "evt_1".to_string())]),
        }
    }

    #[test]
    fn render_includes_context_and_fields() {
        let content = render(&alert("ingestion: failed to apply event"));

        assert!(content.starts_with("**pos-license** `production` `backend` `ERROR`"));
        assert!(content.contains("> ingestion: failed to apply event"));
        assert!(content.contains("- `event_id` = `evt_1`"));
    }

    #[test]
    fn render_truncates_to_discord_limit() {
        let content = render(&alert(&"x".repeat(5000)));

        assert_eq!(content.chars().count(), DISCORD_CONTENT_LIMIT);
        assert!(content.ends_with("(truncated)"));
    }
}
