use std::sync::Arc;

use anyhow::{Result as AnyResult, anyhow};
use chrono::Utc;
use crates::domain::{
    entities::customers::{CustomerEntity, InsertCustomerEntity, UpdateBillingStateEntity},
    repositories::customers::CustomerRepository,
    value_objects::{
        billing_events::{BillingEvent, BillingPeriod, CheckoutCompleted},
        enums::subscription_statuses::SubscriptionStatus,
        subscriptions::{BillingSignal, StatusNotice, plan_checkout, plan_transition},
        unlock_credentials::generate_unlock_credential,
    },
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    billing_gateway::{BillingGateway, SubscriptionSnapshot},
    license_gate::normalize_email,
    license_mailer::LicenseMailer,
};

/// Applies billing events to the customer record. No grace period: a failed
/// payment suspends on the spot, a successful one reactivates on the spot.
pub struct SubscriptionStateUseCase<C, B, M>
where
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    customer_repo: Arc<C>,
    billing_gateway: Arc<B>,
    mailer: Arc<M>,
}

impl<C, B, M> SubscriptionStateUseCase<C, B, M>
where
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    pub fn new(customer_repo: Arc<C>, billing_gateway: Arc<B>, mailer: Arc<M>) -> Self {
        Self {
            customer_repo,
            billing_gateway,
            mailer,
        }
    }

    /// Returns the id of the customer the event was applied to, if any.
    pub async fn apply(&self, event: &BillingEvent) -> AnyResult<Option<Uuid>> {
        match event {
            BillingEvent::CheckoutCompleted(checkout) => self.apply_checkout(checkout).await.map(Some),
            BillingEvent::InvoicePaymentSucceeded(invoice) => self
                .apply_signal(
                    BillingSignal::PaymentSucceeded,
                    invoice.billing_subscription_ref.clone(),
                    invoice.billing_customer_ref.clone(),
                    invoice.period,
                )
                .await
                .map(Some),
            BillingEvent::InvoicePaymentFailed(invoice) => self
                .apply_signal(
                    BillingSignal::PaymentFailed,
                    invoice.billing_subscription_ref.clone(),
                    invoice.billing_customer_ref.clone(),
                    invoice.period,
                )
                .await
                .map(Some),
            BillingEvent::SubscriptionDeleted(deleted) => self
                .apply_signal(
                    BillingSignal::Deleted,
                    Some(deleted.billing_subscription_ref.clone()),
                    deleted.billing_customer_ref.clone(),
                    deleted.period,
                )
                .await
                .map(Some),
            BillingEvent::Unsupported { event_type } => {
                info!(event_type = %event_type, "subscriptions: ignoring unsupported event type");
                Ok(None)
            }
        }
    }

    /// Last-fetched-state-wins: the processor's current view replaces what the event implies.
    async fn refetch(&self, subscription_ref: Option<&str>) -> Option<SubscriptionSnapshot> {
        let subscription_ref = subscription_ref?;

        match self.billing_gateway.fetch_subscription(subscription_ref).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(
                    subscription_ref,
                    error = ?err,
                    "subscriptions: re-fetch failed, applying event as received"
                );
                None
            }
        }
    }

    async fn apply_checkout(&self, checkout: &CheckoutCompleted) -> AnyResult<Uuid> {
        let email = normalize_email(&checkout.email);
        let now = Utc::now();

        let snapshot = self.refetch(checkout.billing_subscription_ref.as_deref()).await;
        let period = snapshot.and_then(|s| s.period);

        let existing = self.customer_repo.find_by_email(&email).await.map_err(|err| {
            error!(db_error = ?err, "subscriptions: failed to look up customer by email");
            err
        })?;

        let plan = plan_checkout(existing.as_ref().map(CustomerEntity::subscription_status));

        let customer = match existing {
            None => {
                let insert_entity = InsertCustomerEntity {
                    email: email.clone(),
                    name: checkout.name.clone(),
                    unlock_credential: generate_unlock_credential(),
                    billing_customer_ref: checkout.billing_customer_ref.clone(),
                    billing_subscription_ref: checkout.billing_subscription_ref.clone(),
                    status: plan.next.to_string(),
                    current_period_start: period.map(|p| p.start),
                    current_period_end: period.map(|p| p.end),
                    next_billing_date: period.map(|p| p.end),
                    last_seen: Some(now),
                    last_validation: Some(now),
                };

                let customer = self.customer_repo.insert_customer(insert_entity).await.map_err(|err| {
                    error!(db_error = ?err, "subscriptions: failed to create customer");
                    err
                })?;
                info!(customer_id = %customer.id, "subscriptions: customer created from checkout");
                customer
            }
            Some(existing) => {
                // The credential is keyed to the email for life and is never regenerated.
                let changes = UpdateBillingStateEntity {
                    name: checkout.name.clone(),
                    billing_customer_ref: checkout.billing_customer_ref.clone(),
                    billing_subscription_ref: checkout.billing_subscription_ref.clone(),
                    status: Some(plan.next.to_string()),
                    current_period_start: period.map(|p| p.start),
                    current_period_end: period.map(|p| p.end),
                    next_billing_date: period.map(|p| p.end),
                    updated_at: Some(now),
                };

                let customer = self
                    .customer_repo
                    .update_billing_state(existing.id, changes)
                    .await
                    .map_err(|err| {
                        error!(customer_id = %existing.id, db_error = ?err, "subscriptions: failed to refresh customer on checkout");
                        err
                    })?;
                info!(
                    customer_id = %customer.id,
                    previous_status = %existing.status,
                    "subscriptions: existing customer re-subscribed"
                );
                customer
            }
        };

        self.notify(plan.notice, &customer).await;
        Ok(customer.id)
    }

    async fn apply_signal(
        &self,
        signal: BillingSignal,
        subscription_ref: Option<String>,
        customer_ref: Option<String>,
        event_period: Option<BillingPeriod>,
    ) -> AnyResult<Uuid> {
        let customer = self
            .customer_repo
            .find_by_billing_refs(subscription_ref.clone(), customer_ref.clone())
            .await?
            // The checkout event may not have landed yet; failing lets the processor retry.
            .ok_or_else(|| {
                anyhow!(
                    "no customer for subscription {:?} / customer {:?}",
                    subscription_ref,
                    customer_ref
                )
            })?;

        // The customer-ref fallback can land an old subscription's event on a
        // customer who has since re-subscribed; that event describes nothing current.
        if let (Some(event_ref), Some(current_ref)) = (
            subscription_ref.as_deref(),
            customer.billing_subscription_ref.as_deref(),
        ) {
            if event_ref != current_ref {
                info!(
                    customer_id = %customer.id,
                    signal = ?signal,
                    event_subscription = event_ref,
                    current_subscription = current_ref,
                    "subscriptions: event is for a superseded subscription, ignoring"
                );
                return Ok(customer.id);
            }
        }

        let snapshot = self.refetch(subscription_ref.as_deref()).await;
        let authoritative = snapshot.as_ref().and_then(|s| s.status);
        let period = snapshot.and_then(|s| s.period).or(event_period);

        let current = customer.subscription_status();
        let plan = plan_transition(current, signal, authoritative);

        if !plan.apply {
            info!(
                customer_id = %customer.id,
                signal = ?signal,
                status = %current,
                "subscriptions: event does not change a cancelled record"
            );
            return Ok(customer.id);
        }

        let changes = UpdateBillingStateEntity {
            billing_subscription_ref: customer
                .billing_subscription_ref
                .is_none()
                .then(|| subscription_ref.clone())
                .flatten(),
            billing_customer_ref: customer
                .billing_customer_ref
                .is_none()
                .then(|| customer_ref.clone())
                .flatten(),
            status: Some(plan.next.to_string()),
            current_period_start: period.map(|p| p.start),
            current_period_end: period.map(|p| p.end),
            next_billing_date: period
                .filter(|_| plan.next == SubscriptionStatus::Active)
                .map(|p| p.end),
            updated_at: Some(Utc::now()),
            ..Default::default()
        };

        let updated = self
            .customer_repo
            .update_billing_state(customer.id, changes)
            .await
            .map_err(|err| {
                error!(customer_id = %customer.id, db_error = ?err, "subscriptions: failed to apply transition");
                err
            })?;

        info!(
            customer_id = %updated.id,
            signal = ?signal,
            from = %current,
            to = %plan.next,
            "subscriptions: transition applied"
        );

        self.notify(plan.notice, &updated).await;
        Ok(updated.id)
    }

    async fn notify(&self, notice: Option<StatusNotice>, customer: &CustomerEntity) {
        let Some(notice) = notice else {
            return;
        };

        let email = customer.email.clone();
        let name = customer.name.clone();
        let result = match notice {
            StatusNotice::Welcome => {
                self.mailer
                    .send_welcome(email, name, customer.unlock_credential.clone())
                    .await
            }
            StatusNotice::Reactivated => self.mailer.send_reactivated(email, name).await,
            StatusNotice::Suspended => self.mailer.send_suspended(email, name).await,
        };

        if let Err(err) = result {
            warn!(
                customer_id = %customer.id,
                notice = ?notice,
                error = ?err,
                "subscriptions: notification failed"
            );
        }
    }
}
