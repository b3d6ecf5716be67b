use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::error;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub portal_return_url: String,
}

/// Thin Stripe REST client over reqwest (form-encoded requests, JSON responses).
pub struct StripeClient {
    http: reqwest::Client,
    settings: StripeSettings,
}

/// Webhook envelope. `data.object` stays raw JSON until narrowed into a billing event.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub created: Option<i64>,
    pub livemode: Option<bool>,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetails,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetails {
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
    message: Option<String>,
    param: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: Option<String>,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Deserialize, Default)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

impl StripeSubscription {
    /// Newer API versions only report the period on subscription items.
    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start
            .or_else(|| self.items.data.first().and_then(|item| item.current_period_start))
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|item| item.current_period_end))
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

#[derive(Deserialize)]
struct IdResp {
    id: String,
}

#[derive(Deserialize)]
struct UrlResp {
    url: Option<String>,
}

impl StripeClient {
    pub fn new(settings: StripeSettings, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build stripe http client")?;

        Ok(Self { http, settings })
    }

    pub fn parse_event(payload: &[u8]) -> Result<StripeEvent> {
        serde_json::from_slice(payload).context("invalid stripe event payload")
    }

    async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = resp.text().await.unwrap_or_default();
        let details = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            stripe_request_id = ?request_id,
            stripe_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            stripe_error_param = ?details.as_ref().and_then(|d| d.param.as_deref()),
            stripe_error_message = ?details.as_ref().and_then(|d| d.message.as_deref()),
            context = %context,
            "stripe: api request failed"
        );

        anyhow::bail!(
            "Stripe API request failed: {} (status {}, request_id={:?})",
            context,
            status,
            request_id
        );
    }

    async fn post_form(&self, path: &str, body: &[(String, String)], context: &str) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(format!("{STRIPE_API_BASE}{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.settings.secret_key))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(body)
            .send()
            .await
            .with_context(|| format!("stripe request failed: {context}"))?;

        Self::ensure_success(resp, context).await
    }

    /// https://stripe.com/docs/api/customers/create
    pub async fn create_customer(&self, email: &str, name: Option<&str>) -> Result<String> {
        let mut body = vec![("email".to_string(), email.to_string())];
        if let Some(name) = name {
            body.push(("name".to_string(), name.to_string()));
        }

        let resp = self.post_form("/customers", &body, "create customer").await?;
        let parsed: IdResp = resp.json().await?;
        Ok(parsed.id)
    }

    /// Subscription-mode Checkout for the configured price. Returns the hosted URL.
    pub async fn create_checkout_session(
        &self,
        email: &str,
        customer_id: Option<String>,
    ) -> Result<String> {
        let mut body = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), self.settings.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.settings.success_url.clone()),
            ("cancel_url".to_string(), self.settings.cancel_url.clone()),
        ];

        match customer_id {
            Some(customer) => body.push(("customer".to_string(), customer)),
            None => body.push(("customer_email".to_string(), email.to_string())),
        }

        let resp = self
            .post_form("/checkout/sessions", &body, "create checkout session")
            .await?;
        let parsed: UrlResp = resp.json().await?;
        parsed
            .url
            .ok_or_else(|| anyhow::anyhow!("Stripe Checkout session URL is missing"))
    }

    /// https://stripe.com/docs/api/customer_portal/sessions/create
    pub async fn create_portal_session(&self, customer_id: &str) -> Result<String> {
        let body = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), self.settings.portal_return_url.clone()),
        ];

        let resp = self
            .post_form("/billing_portal/sessions", &body, "create billing portal session")
            .await?;
        let parsed: UrlResp = resp.json().await?;
        parsed
            .url
            .ok_or_else(|| anyhow::anyhow!("Stripe billing portal URL is missing"))
    }

    /// https://stripe.com/docs/api/subscriptions/retrieve
    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<StripeSubscription> {
        let resp = self
            .http
            .get(format!("{STRIPE_API_BASE}/subscriptions/{subscription_id}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.settings.secret_key))
            .send()
            .await
            .context("stripe request failed: retrieve subscription")?;
        let resp = Self::ensure_success(resp, "retrieve subscription").await?;

        let subscription: StripeSubscription = resp.json().await?;
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_envelope() {
        let payload = br#"{
            "id": "evt_1",
            "type": "invoice.payment_failed",
            "created": 1700000000,
            "livemode": false,
            "data": { "object": { "id": "in_1" } }
        }"#;

        let event = StripeClient::parse_event(payload).unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.type_, "invoice.payment_failed");
        assert_eq!(event.data.object["id"], "in_1");
    }

    #[test]
    fn rejects_envelope_without_id() {
        let payload = br#"{ "type": "invoice.paid", "data": { "object": {} } }"#;
        assert!(StripeClient::parse_event(payload).is_err());
    }

    #[test]
    fn subscription_period_falls_back_to_first_item() {
        let subscription: StripeSubscription = serde_json::from_value(serde_json::json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "items": { "data": [ { "current_period_start": 100, "current_period_end": 200 } ] }
        }))
        .unwrap();

        assert_eq!(subscription.period_start().map(|d| d.timestamp()), Some(100));
        assert_eq!(subscription.period_end().map(|d| d.timestamp()), Some(200));
    }
}
