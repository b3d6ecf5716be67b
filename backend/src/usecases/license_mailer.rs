use anyhow::Result as AnyResult;
use async_trait::async_trait;
use crates::notifications::email_client::EmailClient;
use serde_json::Value;
use tracing::info;

/// Customer-facing license notices. Every send is best-effort.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LicenseMailer: Send + Sync {
    async fn send_welcome(
        &self,
        email: String,
        name: Option<String>,
        unlock_credential: String,
    ) -> AnyResult<()>;

    async fn send_reactivated(&self, email: String, name: Option<String>) -> AnyResult<()>;

    async fn send_suspended(&self, email: String, name: Option<String>) -> AnyResult<()>;

    /// `device_info` is whatever the new device reported about itself.
    async fn send_machine_changed(
        &self,
        email: String,
        name: Option<String>,
        device_info: Option<Value>,
    ) -> AnyResult<()>;
}

/// Sends through the email provider, or only logs when no provider is configured.
pub struct EmailLicenseMailer {
    client: Option<EmailClient>,
    support_email: String,
}

impl EmailLicenseMailer {
    pub fn new(client: Option<EmailClient>, support_email: String) -> Self {
        Self {
            client,
            support_email,
        }
    }

    async fn deliver(&self, to: &str, subject: &str, body: String) -> AnyResult<()> {
        match &self.client {
            Some(client) => client.send(to, subject, &body).await,
            None => {
                info!(subject, "mailer: no email provider configured, skipping send");
                Ok(())
            }
        }
    }
}

fn greeting(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hi {name},"),
        None => "Hi,".to_string(),
    }
}

/// Prefers the reported device name; anything else is shown as sent.
fn describe_device(device_info: Option<&Value>) -> Option<String> {
    match device_info? {
        Value::Null => None,
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::String(_) => None,
        Value::Object(fields) => match fields.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => Some(name.trim().to_string()),
            _ => Some(Value::Object(fields.clone()).to_string()),
        },
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl LicenseMailer for EmailLicenseMailer {
    async fn send_welcome(
        &self,
        email: String,
        name: Option<String>,
        unlock_credential: String,
    ) -> AnyResult<()> {
        let body = format!(
            "{}\n\nYour POS subscription is active. Unlock code: {}\n\nKeep this code; it stays the same for as long as you use this email.\nQuestions: {}",
            greeting(name.as_deref()),
            unlock_credential,
            self.support_email
        );
        self.deliver(&email, "Your POS unlock code", body).await
    }

    async fn send_reactivated(&self, email: String, name: Option<String>) -> AnyResult<()> {
        let body = format!(
            "{}\n\nPayment received. Printing is enabled again with your existing unlock code.\nQuestions: {}",
            greeting(name.as_deref()),
            self.support_email
        );
        self.deliver(&email, "Your POS subscription is active again", body)
            .await
    }

    async fn send_suspended(&self, email: String, name: Option<String>) -> AnyResult<()> {
        let body = format!(
            "{}\n\nWe could not collect your latest payment, so printing is paused until it succeeds.\nUpdate your payment method or contact {}.",
            greeting(name.as_deref()),
            self.support_email
        );
        self.deliver(&email, "Your POS subscription is paused", body)
            .await
    }

    async fn send_machine_changed(
        &self,
        email: String,
        name: Option<String>,
        device_info: Option<Value>,
    ) -> AnyResult<()> {
        let device = describe_device(device_info.as_ref())
            .map(|device| format!(" ({device})"))
            .unwrap_or_default();
        let body = format!(
            "{}\n\nYour unlock code was just used on a different device{}.\nIf this was not you, contact {}.",
            greeting(name.as_deref()),
            device,
            self.support_email
        );
        self.deliver(&email, "POS license used on a new device", body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn greeting_uses_name_when_present() {
        assert_eq!(greeting(Some("Mali")), "Hi Mali,");
        assert_eq!(greeting(Some("  ")), "Hi,");
        assert_eq!(greeting(None), "Hi,");
    }

    #[test]
    fn device_is_described_by_name_then_raw_blob() {
        assert_eq!(
            describe_device(Some(&json!({ "name": " Front till ", "os": "windows" }))),
            Some("Front till".to_string())
        );
        assert_eq!(
            describe_device(Some(&json!({ "os": "windows" }))),
            Some(r#"{"os":"windows"}"#.to_string())
        );
        assert_eq!(describe_device(Some(&Value::Null)), None);
        assert_eq!(describe_device(None), None);
    }

    #[tokio::test]
    async fn log_only_mailer_succeeds_without_provider() {
        let mailer = EmailLicenseMailer::new(None, "support@pos.test".to_string());

        mailer
            .send_welcome(
                "owner@cafe.test".to_string(),
                None,
                "POS-AAAA-BBBB-CCCC-DDDD".to_string(),
            )
            .await
            .unwrap();
    }
}
