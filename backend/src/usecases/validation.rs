use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crates::domain::{
    repositories::customers::CustomerRepository,
    value_objects::{
        enums::caching_strategies::{CachingDirective, CachingStrategy},
        machine_identity::MachineHasher,
        subscriptions::SubscriptionSummary,
    },
};
use serde_json::Value;
use tracing::{info, warn};

use super::{
    license_gate::{LicenseGate, ValidationError},
    license_mailer::LicenseMailer,
};

#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub email: String,
    pub unlock_credential: String,
    pub machine_fingerprint: String,
    pub device_info: Option<Value>,
    pub skip_machine_update: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSuccess {
    pub customer_name: Option<String>,
    pub subscription: SubscriptionSummary,
    pub machine_changed: bool,
    pub caching: CachingDirective,
}

/// What to do with the stored machine hash for this validation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MachineBinding {
    Unchanged,
    FirstBinding(String),
    Changed(String),
}

fn machine_binding(stored: Option<&str>, presented: String, skip_machine_update: bool) -> MachineBinding {
    match stored {
        None => MachineBinding::FirstBinding(presented),
        Some(stored) if stored == presented => MachineBinding::Unchanged,
        Some(_) if skip_machine_update => MachineBinding::Unchanged,
        Some(_) => MachineBinding::Changed(presented),
    }
}

pub struct ValidationUseCase<C, M>
where
    C: CustomerRepository + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    gate: Arc<LicenseGate<C>>,
    hasher: MachineHasher,
    mailer: Arc<M>,
    request_timeout: Duration,
}

impl<C, M> ValidationUseCase<C, M>
where
    C: CustomerRepository + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    pub fn new(
        gate: Arc<LicenseGate<C>>,
        hasher: MachineHasher,
        mailer: Arc<M>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            hasher,
            mailer,
            request_timeout,
        }
    }

    /// Answers "may this device operate now?" under an absolute deadline.
    pub async fn validate(
        &self,
        request: ValidationRequest,
    ) -> Result<ValidationSuccess, ValidationError> {
        match tokio::time::timeout(self.request_timeout, self.validate_at(request, Utc::now())).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "validation: request timed out"
                );
                Err(ValidationError::SystemDegraded)
            }
        }
    }

    async fn validate_at(
        &self,
        request: ValidationRequest,
        now: DateTime<Utc>,
    ) -> Result<ValidationSuccess, ValidationError> {
        if request.machine_fingerprint.trim().is_empty() {
            return Err(ValidationError::MissingRequiredFields);
        }

        let customer = self
            .gate
            .authenticate(&request.email, &request.unlock_credential)
            .await?;

        if let Err(err) = self.gate.require_entitled(&customer, now) {
            info!(customer_id = %customer.id, status = %customer.status, "validation: subscription not entitled");
            return Err(err);
        }

        let presented = self.hasher.hash(request.machine_fingerprint.trim());
        let binding = machine_binding(
            customer.machine_identity_hash.as_deref(),
            presented,
            request.skip_machine_update,
        );

        // Chosen from the previous validation, before this one is recorded.
        let strategy = CachingStrategy::select(
            customer.last_validation,
            customer.subscription_status(),
            now,
        );

        let (hash_to_store, machine_changed) = match binding {
            MachineBinding::Unchanged => (None, false),
            MachineBinding::FirstBinding(hash) => (Some(hash), false),
            MachineBinding::Changed(hash) => (Some(hash), true),
        };

        self.gate
            .protect("record_validation", || {
                self.gate
                    .customer_repo()
                    .record_validation(customer.id, hash_to_store, now)
            })
            .await?;

        if machine_changed {
            info!(
                customer_id = %customer.id,
                device_info = ?request.device_info,
                "validation: machine change recorded"
            );
            let mailer = Arc::clone(&self.mailer);
            let email = customer.email.clone();
            let name = customer.name.clone();
            let device_info = request.device_info;
            let customer_id = customer.id;
            tokio::spawn(async move {
                if let Err(err) = mailer.send_machine_changed(email, name, device_info).await {
                    warn!(customer_id = %customer_id, error = ?err, "validation: machine-changed notification failed");
                }
            });
        }

        Ok(ValidationSuccess {
            customer_name: customer.name.clone(),
            subscription: SubscriptionSummary::new(
                customer.subscription_status(),
                customer.current_period_end,
                now,
            ),
            machine_changed,
            caching: CachingDirective::from(strategy),
        })
    }
}
