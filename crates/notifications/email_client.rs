use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use tracing::{debug, error};

pub const DEFAULT_EMAIL_API_BASE: &str = "https://api.resend.com";

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub api_key: String,
    pub from: String,
    pub api_base_url: String,
}

/// Transactional email over the Resend HTTP API. Sends are single attempts;
/// callers log failures and move on.
pub struct EmailClient {
    http: reqwest::Client,
    settings: EmailSettings,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

impl EmailClient {
    pub fn new(settings: EmailSettings, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build email http client")?;

        Ok(Self { http, settings })
    }

    pub async fn send(&self, to: &str, subject: &str, text: &str) -> Result<()> {
        let url = format!("{}/emails", self.settings.api_base_url.trim_end_matches('/'));
        let request = SendEmailRequest {
            from: &self.settings.from,
            to: [to],
            subject,
            text,
        };

        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.settings.api_key))
            .json(&request)
            .send()
            .await
            .context("email request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, response_body = %body, subject, "email: provider rejected message");
            anyhow::bail!("email provider returned status {status}");
        }

        debug!(subject, "email: message accepted");
        Ok(())
    }
}
