use std::sync::Arc;

use anyhow::Context;
use crates::domain::repositories::customers::CustomerRepository;
use thiserror::Error;
use tracing::{error, info};

use super::{
    billing_gateway::BillingGateway,
    license_gate::{LicenseGate, ValidationError, normalize_email},
};

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("A valid email address is required.")]
    InvalidEmail,
    #[error(transparent)]
    Access(#[from] ValidationError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BillingError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        match self {
            BillingError::InvalidEmail => axum::http::StatusCode::BAD_REQUEST,
            BillingError::Access(err) => err.status_code(),
            BillingError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Hands out hosted Stripe pages: checkout for new subscribers and the
/// billing portal for existing ones.
pub struct BillingUseCase<C, B>
where
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + 'static,
{
    gate: Arc<LicenseGate<C>>,
    gateway: Arc<B>,
}

impl<C, B> BillingUseCase<C, B>
where
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + 'static,
{
    pub fn new(gate: Arc<LicenseGate<C>>, gateway: Arc<B>) -> Self {
        Self { gate, gateway }
    }

    /// Known emails reuse their Stripe customer so history stays on one record.
    pub async fn checkout(&self, email: &str) -> Result<String, BillingError> {
        let email = normalize_email(email);
        if !looks_like_email(&email) {
            return Err(BillingError::InvalidEmail);
        }

        let existing = self
            .gate
            .customer_repo()
            .find_by_email(&email)
            .await
            .context("billing: failed to look up customer for checkout")?;
        let customer_ref = existing.and_then(|customer| customer.billing_customer_ref);

        let url = self
            .gateway
            .create_checkout_session(&email, customer_ref.clone())
            .await
            .map_err(|err| {
                error!(error = ?err, "billing: checkout session creation failed");
                err
            })?;

        info!(reused_customer = customer_ref.is_some(), "billing: checkout session created");
        Ok(url)
    }

    /// Inactive customers are let through so they can repair their billing.
    pub async fn portal(&self, email: &str, unlock_credential: &str) -> Result<String, BillingError> {
        let customer = self.gate.authenticate(email, unlock_credential).await?;

        let customer_ref = match customer.billing_customer_ref.clone() {
            Some(customer_ref) => customer_ref,
            None => {
                let created = self
                    .gateway
                    .create_customer(&customer.email, customer.name.clone())
                    .await
                    .context("billing: failed to create billing customer")?;
                self.gate
                    .customer_repo()
                    .set_billing_customer_ref(customer.id, &created)
                    .await
                    .context("billing: failed to store billing customer ref")?;
                info!(customer_id = %customer.id, "billing: billing customer created lazily");
                created
            }
        };

        let url = self
            .gateway
            .create_portal_session(&customer_ref)
            .await
            .map_err(|err| {
                error!(customer_id = %customer.id, error = ?err, "billing: portal session creation failed");
                err
            })?;

        Ok(url)
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
