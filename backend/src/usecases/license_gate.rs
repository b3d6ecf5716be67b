use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crates::{
    domain::{
        entities::customers::CustomerEntity,
        repositories::customers::CustomerRepository,
        value_objects::{
            enums::{
                caching_strategies::{CachingDirective, CachingStrategy},
                subscription_statuses::SubscriptionStatus,
            },
            subscriptions::{CancellationPolicy, days_since},
            unlock_credentials::normalize_unlock_credential,
        },
    },
    resilience::circuit_breaker::{BreakerError, CircuitBreaker},
};
use thiserror::Error;
use tracing::{error, warn};

/// Failure taxonomy shared by every device-facing license call.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Email, unlock code and machine fingerprint are required.")]
    MissingRequiredFields,
    #[error("The email or unlock code is incorrect.")]
    InvalidCredentials,
    #[error("Your subscription is {status}. Please update your billing details.")]
    SubscriptionInactive {
        status: SubscriptionStatus,
        days_since_last_seen: Option<i64>,
        support_email: String,
    },
    #[error("License service is temporarily unavailable. Please retry shortly.")]
    SystemDegraded,
}

impl ValidationError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ValidationError::MissingRequiredFields => StatusCode::BAD_REQUEST,
            ValidationError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ValidationError::SubscriptionInactive { .. } => StatusCode::FORBIDDEN,
            ValidationError::SystemDegraded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::MissingRequiredFields => "missing_required_fields",
            ValidationError::InvalidCredentials => "invalid_credentials",
            ValidationError::SubscriptionInactive { .. } => "subscription_inactive",
            ValidationError::SystemDegraded => "system_degraded",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ValidationError::MissingRequiredFields => "Missing required fields",
            ValidationError::InvalidCredentials => "Invalid credentials",
            ValidationError::SubscriptionInactive { .. } => "Subscription inactive",
            ValidationError::SystemDegraded => "System degraded",
        }
    }

    /// Devices holding a terminal "not licensed" answer re-check soon.
    pub fn caching(&self) -> Option<CachingDirective> {
        match self {
            ValidationError::SubscriptionInactive { .. } => {
                Some(CachingDirective::from(CachingStrategy::Minimal))
            }
            _ => None,
        }
    }

    /// Terminal answers versus "try again later".
    pub fn is_retryable(&self) -> bool {
        matches!(self, ValidationError::SystemDegraded)
    }
}

/// Authenticates `(email, unlock credential)` pairs and decides entitlement.
/// Every store call made here goes through the shared circuit breaker.
pub struct LicenseGate<C>
where
    C: CustomerRepository + Send + Sync + 'static,
{
    customer_repo: Arc<C>,
    breaker: Arc<CircuitBreaker>,
    cancellation_policy: CancellationPolicy,
    support_email: String,
}

impl<C> LicenseGate<C>
where
    C: CustomerRepository + Send + Sync + 'static,
{
    pub fn new(
        customer_repo: Arc<C>,
        breaker: Arc<CircuitBreaker>,
        cancellation_policy: CancellationPolicy,
        support_email: String,
    ) -> Self {
        Self {
            customer_repo,
            breaker,
            cancellation_policy,
            support_email,
        }
    }

    pub fn customer_repo(&self) -> &Arc<C> {
        &self.customer_repo
    }

    /// Runs a store call through the breaker; any failure reads as `SystemDegraded`.
    /// The store is not touched while the breaker is open.
    pub async fn protect<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, ValidationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.breaker.call(call).await.map_err(|err| {
            match &err {
                BreakerError::Open { name } => {
                    warn!(breaker = %name, operation, "license_gate: breaker open, rejecting call");
                }
                BreakerError::Failed(cause) => {
                    error!(operation, db_error = ?cause, "license_gate: store call failed");
                }
            }
            ValidationError::SystemDegraded
        })
    }

    pub async fn authenticate(
        &self,
        email: &str,
        unlock_credential: &str,
    ) -> Result<CustomerEntity, ValidationError> {
        let email = normalize_email(email);
        let unlock_credential = normalize_unlock_credential(unlock_credential);
        if email.is_empty() || unlock_credential.is_empty() {
            return Err(ValidationError::MissingRequiredFields);
        }

        self.protect("find_by_credentials", || {
            self.customer_repo
                .find_by_credentials(&email, &unlock_credential)
        })
        .await?
        .ok_or(ValidationError::InvalidCredentials)
    }

    /// Status gate applied after authentication; no exceptions for recent activity.
    pub fn require_entitled(
        &self,
        customer: &CustomerEntity,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let status = customer.subscription_status();
        if self
            .cancellation_policy
            .is_entitled(status, customer.current_period_end, now)
        {
            return Ok(());
        }

        Err(ValidationError::SubscriptionInactive {
            status,
            days_since_last_seen: days_since(customer.last_seen, now),
            support_email: self.support_email.clone(),
        })
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
