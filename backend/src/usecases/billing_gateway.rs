use anyhow::Result as AnyResult;
use async_trait::async_trait;
use crates::{
    domain::value_objects::{
        billing_events::BillingPeriod, enums::subscription_statuses::SubscriptionStatus,
    },
    payments::stripe_client::StripeClient,
};

/// What the billing processor currently says about a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    /// `None` when the processor reports a status with no local meaning.
    pub status: Option<SubscriptionStatus>,
    pub period: Option<BillingPeriod>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn fetch_subscription(&self, subscription_ref: &str) -> AnyResult<SubscriptionSnapshot>;

    async fn create_customer(&self, email: &str, name: Option<String>) -> AnyResult<String>;

    async fn create_checkout_session(
        &self,
        email: &str,
        customer_ref: Option<String>,
    ) -> AnyResult<String>;

    async fn create_portal_session(&self, customer_ref: &str) -> AnyResult<String>;
}

#[async_trait]
impl BillingGateway for StripeClient {
    async fn fetch_subscription(&self, subscription_ref: &str) -> AnyResult<SubscriptionSnapshot> {
        let subscription = self.retrieve_subscription(subscription_ref).await?;

        let period = match (subscription.period_start(), subscription.period_end()) {
            (Some(start), Some(end)) => Some(BillingPeriod { start, end }),
            _ => None,
        };

        Ok(SubscriptionSnapshot {
            status: SubscriptionStatus::from_stripe_status(&subscription.status),
            period,
        })
    }

    async fn create_customer(&self, email: &str, name: Option<String>) -> AnyResult<String> {
        self.create_customer(email, name.as_deref()).await
    }

    async fn create_checkout_session(
        &self,
        email: &str,
        customer_ref: Option<String>,
    ) -> AnyResult<String> {
        self.create_checkout_session(email, customer_ref).await
    }

    async fn create_portal_session(&self, customer_ref: &str) -> AnyResult<String> {
        self.create_portal_session(customer_ref).await
    }
}
