use std::sync::Arc;

use chrono::Utc;
use crates::{
    domain::{
        repositories::{customers::CustomerRepository, webhook_events::WebhookEventRepository},
        value_objects::{billing_events::BillingEvent, webhook_events::EventClaim},
    },
    payments::{
        stripe_client::StripeClient,
        webhook_signature::{SignatureError, verify_stripe_signature},
    },
    resilience::retry::{RetryPolicy, retry_with_backoff},
};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    billing_gateway::BillingGateway, license_mailer::LicenseMailer,
    subscription_state::SubscriptionStateUseCase,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionOutcome {
    Completed { customer_id: Option<Uuid> },
    /// Already completed earlier; nothing was done.
    Idempotent,
    /// Another delivery of the same event is still being processed.
    DuplicateInProgress,
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("missing stripe-signature header")]
    MissingSignature,
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
    #[error("event processing failed: {0}")]
    Processing(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IngestionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            IngestionError::MissingSignature
            | IngestionError::InvalidSignature(_)
            | IngestionError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            IngestionError::Processing(_) | IngestionError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type IngestionResult<T> = std::result::Result<T, IngestionError>;

/// Idempotency guard in front of the subscription state machine: each external
/// event id is recorded as `processing` before any side effect, then finished
/// as `completed` or `failed`.
pub struct EventIngestionUseCase<W, C, B, M>
where
    W: WebhookEventRepository + Send + Sync + 'static,
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    event_repo: Arc<W>,
    subscription_state: SubscriptionStateUseCase<C, B, M>,
    webhook_secret: String,
    retry_policy: RetryPolicy,
}

impl<W, C, B, M> EventIngestionUseCase<W, C, B, M>
where
    W: WebhookEventRepository + Send + Sync + 'static,
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    pub fn new(
        event_repo: Arc<W>,
        subscription_state: SubscriptionStateUseCase<C, B, M>,
        webhook_secret: String,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            event_repo,
            subscription_state,
            webhook_secret,
            retry_policy,
        }
    }

    /// Verifies and ingests a raw webhook delivery. Nothing is recorded when the
    /// signature or envelope is bad.
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> IngestionResult<IngestionOutcome> {
        let signature = signature.ok_or(IngestionError::MissingSignature)?;

        verify_stripe_signature(&self.webhook_secret, payload, signature, Utc::now().timestamp())
            .inspect_err(|err| warn!(error = %err, "ingestion: rejected webhook signature"))?;

        let event = StripeClient::parse_event(payload)
            .map_err(|err| IngestionError::InvalidPayload(format!("{err:#}")))?;

        self.ingest(&event.id, &event.type_, &event.data.object).await
    }

    pub async fn ingest(
        &self,
        external_event_id: &str,
        event_type: &str,
        object: &Value,
    ) -> IngestionResult<IngestionOutcome> {
        let claim = retry_with_backoff(&self.retry_policy, "claim_event", || {
            self.event_repo.claim_event(external_event_id, event_type)
        })
        .await
        .map_err(|err| {
            error!(event_id = %external_event_id, db_error = ?err, "ingestion: failed to claim event");
            IngestionError::Internal(err)
        })?;

        let (event_row_id, attempt) = match claim {
            EventClaim::AlreadyCompleted => {
                info!(event_id = %external_event_id, "ingestion: event already completed");
                return Ok(IngestionOutcome::Idempotent);
            }
            EventClaim::InProgress => {
                info!(event_id = %external_event_id, "ingestion: event is being processed elsewhere");
                return Ok(IngestionOutcome::DuplicateInProgress);
            }
            EventClaim::Claimed {
                event_row_id,
                attempt,
            } => (event_row_id, attempt),
        };

        let event = match BillingEvent::parse(event_type, object) {
            Ok(event) => event,
            Err(err) => {
                warn!(event_id = %external_event_id, error = %err, "ingestion: unparseable event object");
                self.finish_failed(event_row_id, &err.to_string()).await;
                return Err(IngestionError::InvalidPayload(err.to_string()));
            }
        };

        match self.subscription_state.apply(&event).await {
            Ok(customer_id) => {
                retry_with_backoff(&self.retry_policy, "mark_completed", || {
                    self.event_repo.mark_completed(event_row_id, customer_id)
                })
                .await
                .map_err(|err| {
                    error!(event_id = %external_event_id, db_error = ?err, "ingestion: failed to mark event completed");
                    IngestionError::Internal(err)
                })?;

                info!(
                    event_id = %external_event_id,
                    event_type = %event.kind(),
                    attempt,
                    customer_id = ?customer_id,
                    "ingestion: event completed"
                );
                Ok(IngestionOutcome::Completed { customer_id })
            }
            Err(err) => {
                error!(
                    event_id = %external_event_id,
                    event_type = %event.kind(),
                    attempt,
                    error = ?err,
                    "ingestion: failed to apply event"
                );
                self.finish_failed(event_row_id, &format!("{err:#}")).await;
                Err(IngestionError::Processing(err.to_string()))
            }
        }
    }

    async fn finish_failed(&self, event_row_id: Uuid, reason: &str) {
        let marked = retry_with_backoff(&self.retry_policy, "mark_failed", || {
            self.event_repo.mark_failed(event_row_id, reason)
        })
        .await;

        // The row stays `processing`; a re-delivery then reports a duplicate instead of reprocessing.
        if let Err(err) = marked {
            error!(event_row_id = %event_row_id, db_error = ?err, "ingestion: failed to mark event failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::{
        billing_gateway::MockBillingGateway, license_mailer::MockLicenseMailer,
    };
    use crates::domain::repositories::{
        customers::MockCustomerRepository, webhook_events::MockWebhookEventRepository,
    };
    use hmac::{Hmac, Mac};
    use serde_json::json;
    use sha2::Sha256;
    use std::time::Duration;

    const SECRET: &str = "whsec_test";

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        }
    }

    fn usecase(
        event_repo: MockWebhookEventRepository,
        customer_repo: MockCustomerRepository,
    ) -> EventIngestionUseCase<
        MockWebhookEventRepository,
        MockCustomerRepository,
        MockBillingGateway,
        MockLicenseMailer,
    > {
        EventIngestionUseCase::new(
            Arc::new(event_repo),
            SubscriptionStateUseCase::new(
                Arc::new(customer_repo),
                Arc::new(MockBillingGateway::new()),
                Arc::new(MockLicenseMailer::new()),
            ),
            SECRET.to_string(),
            fast_retry(),
        )
    }

    fn sign(payload: &[u8]) -> String {
        let timestamp = Utc::now().timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[tokio::test]
    async fn completed_event_is_idempotent() {
        let mut event_repo = MockWebhookEventRepository::new();
        event_repo
            .expect_claim_event()
            .returning(|_, _| Box::pin(async { Ok(EventClaim::AlreadyCompleted) }));
        event_repo.expect_mark_completed().never();

        let outcome = usecase(event_repo, MockCustomerRepository::new())
            .ingest("evt_1", "invoice.payment_succeeded", &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome, IngestionOutcome::Idempotent);
    }

    #[tokio::test]
    async fn in_flight_event_reports_duplicate() {
        let mut event_repo = MockWebhookEventRepository::new();
        event_repo
            .expect_claim_event()
            .returning(|_, _| Box::pin(async { Ok(EventClaim::InProgress) }));

        let outcome = usecase(event_repo, MockCustomerRepository::new())
            .ingest("evt_1", "invoice.payment_succeeded", &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome, IngestionOutcome::DuplicateInProgress);
    }

    #[tokio::test]
    async fn unsupported_event_is_completed_without_side_effects() {
        let row_id = Uuid::new_v4();
        let mut event_repo = MockWebhookEventRepository::new();
        event_repo.expect_claim_event().returning(move |_, _| {
            Box::pin(async move {
                Ok(EventClaim::Claimed {
                    event_row_id: row_id,
                    attempt: 1,
                })
            })
        });
        event_repo
            .expect_mark_completed()
            .times(1)
            .returning(move |id, customer_id| {
                assert_eq!(id, row_id);
                assert_eq!(customer_id, None);
                Box::pin(async { Ok(()) })
            });

        let outcome = usecase(event_repo, MockCustomerRepository::new())
            .ingest("evt_2", "customer.updated", &json!({ "id": "cus_1" }))
            .await
            .unwrap();

        assert_eq!(outcome, IngestionOutcome::Completed { customer_id: None });
    }

    #[tokio::test]
    async fn business_failure_marks_failed_and_surfaces() {
        let row_id = Uuid::new_v4();
        let mut event_repo = MockWebhookEventRepository::new();
        let mut customer_repo = MockCustomerRepository::new();
        event_repo.expect_claim_event().returning(move |_, _| {
            Box::pin(async move {
                Ok(EventClaim::Claimed {
                    event_row_id: row_id,
                    attempt: 2,
                })
            })
        });
        customer_repo
            .expect_find_by_billing_refs()
            .returning(|_, _| Box::pin(async { Ok(None) }));
        event_repo
            .expect_mark_failed()
            .times(1)
            .returning(|_, reason| {
                assert!(reason.contains("no customer"));
                Box::pin(async { Ok(()) })
            });
        event_repo.expect_mark_completed().never();

        let err = usecase(event_repo, customer_repo)
            .ingest(
                "evt_3",
                "invoice.payment_failed",
                &json!({ "id": "in_1", "customer": "cus_x", "subscription": "sub_x" }),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::Processing(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn transient_claim_failures_are_retried() {
        let mut event_repo = MockWebhookEventRepository::new();
        let mut seq = mockall::Sequence::new();
        event_repo
            .expect_claim_event()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Box::pin(async { Err(anyhow::anyhow!("connection reset")) }));
        event_repo
            .expect_claim_event()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Box::pin(async { Ok(EventClaim::AlreadyCompleted) }));

        let outcome = usecase(event_repo, MockCustomerRepository::new())
            .ingest("evt_4", "invoice.payment_succeeded", &json!({}))
            .await
            .unwrap();

        assert_eq!(outcome, IngestionOutcome::Idempotent);
    }

    #[tokio::test]
    async fn bad_signature_records_nothing() {
        let mut event_repo = MockWebhookEventRepository::new();
        event_repo.expect_claim_event().never();
        let payload = br#"{"id":"evt_5","type":"invoice.payment_succeeded","data":{"object":{}}}"#;
        let header = sign(b"something else");

        let err = usecase(event_repo, MockCustomerRepository::new())
            .handle_webhook(payload, Some(&header))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestionError::InvalidSignature(SignatureError::Mismatch)
        ));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let err = usecase(MockWebhookEventRepository::new(), MockCustomerRepository::new())
            .handle_webhook(b"{}", None)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestionError::MissingSignature));
    }

    #[tokio::test]
    async fn signed_webhook_reaches_the_guard() {
        let mut event_repo = MockWebhookEventRepository::new();
        event_repo.expect_claim_event().times(1).returning(|id, kind| {
            assert_eq!(id, "evt_6");
            assert_eq!(kind, "invoice.payment_succeeded");
            Box::pin(async { Ok(EventClaim::AlreadyCompleted) })
        });
        let payload = br#"{"id":"evt_6","type":"invoice.payment_succeeded","data":{"object":{"id":"in_6"}}}"#;
        let header = sign(payload);

        let outcome = usecase(event_repo, MockCustomerRepository::new())
            .handle_webhook(payload, Some(&header))
            .await
            .unwrap();

        assert_eq!(outcome, IngestionOutcome::Idempotent);
    }
}
