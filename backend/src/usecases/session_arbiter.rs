use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crates::domain::{
    repositories::{active_sessions::ActiveSessionRepository, customers::CustomerRepository},
    value_objects::{
        machine_identity::MachineHasher,
        sessions::{HeartbeatOutcome, NewSessionModel, SessionStartOutcome, TakeoverOutcome},
    },
};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::license_gate::{LicenseGate, ValidationError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("A session id is required.")]
    MissingSessionId,
    #[error("This session id is already in use.")]
    SessionIdTaken,
}

impl SessionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        match self {
            SessionError::Validation(err) => err.status_code(),
            SessionError::MissingSessionId => axum::http::StatusCode::BAD_REQUEST,
            SessionError::SessionIdTaken => axum::http::StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionClaim {
    pub email: String,
    pub unlock_credential: String,
    pub machine_fingerprint: String,
    pub session_id: String,
    pub device_info: Option<Value>,
}

pub struct SessionArbiterUseCase<C, S>
where
    C: CustomerRepository + Send + Sync + 'static,
    S: ActiveSessionRepository + Send + Sync + 'static,
{
    gate: Arc<LicenseGate<C>>,
    session_repo: Arc<S>,
    hasher: MachineHasher,
    request_timeout: Duration,
}

impl<C, S> SessionArbiterUseCase<C, S>
where
    C: CustomerRepository + Send + Sync + 'static,
    S: ActiveSessionRepository + Send + Sync + 'static,
{
    pub fn new(
        gate: Arc<LicenseGate<C>>,
        session_repo: Arc<S>,
        hasher: MachineHasher,
        request_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            session_repo,
            hasher,
            request_timeout,
        }
    }

    pub async fn start(&self, claim: SessionClaim) -> Result<SessionStartOutcome, SessionError> {
        self.with_deadline("start", async {
            let now = Utc::now();
            let new_session = self.authorize(claim, now).await?;
            let customer_id = new_session.customer_id;
            let session_id = new_session.session_id.clone();

            let outcome = self
                .gate
                .protect("start_session", || {
                    self.session_repo.start_session(new_session, now)
                })
                .await?;

            match &outcome {
                SessionStartOutcome::Granted => {
                    info!(%customer_id, %session_id, "sessions: session granted");
                }
                SessionStartOutcome::Conflict(conflict) => {
                    info!(%customer_id, %session_id, other_last_seen = %conflict.last_seen, "sessions: another device holds the license");
                }
                SessionStartOutcome::SessionIdTaken => {
                    warn!(%customer_id, %session_id, "sessions: session id belongs to another customer");
                }
            }
            Ok(outcome)
        })
        .await
    }

    /// Grants for an entitled customer unless the session id belongs to another
    /// customer; every other live session of the customer is kicked.
    pub async fn takeover(&self, claim: SessionClaim) -> Result<String, SessionError> {
        self.with_deadline("takeover", async {
            let now = Utc::now();
            let new_session = self.authorize(claim, now).await?;
            let customer_id = new_session.customer_id;
            let session_id = new_session.session_id.clone();

            let outcome = self
                .gate
                .protect("takeover_session", || {
                    self.session_repo.takeover_session(new_session, now)
                })
                .await?;

            let TakeoverOutcome::Granted { kicked } = outcome else {
                warn!(%customer_id, %session_id, "sessions: session id belongs to another customer");
                return Err(SessionError::SessionIdTaken);
            };

            info!(%customer_id, %session_id, kicked, "sessions: session taken over");
            Ok(session_id)
        })
        .await
    }

    pub async fn heartbeat(&self, session_id: &str) -> Result<HeartbeatOutcome, SessionError> {
        let session_id = require_session_id(session_id)?;
        self.with_deadline("heartbeat", async {
            let outcome = self
                .gate
                .protect("heartbeat", || {
                    self.session_repo.heartbeat(session_id, Utc::now())
                })
                .await?;

            if outcome == HeartbeatOutcome::Kicked {
                info!(%session_id, "sessions: heartbeat from kicked session");
            }
            Ok(outcome)
        })
        .await
    }

    pub async fn end(&self, session_id: &str) -> Result<(), SessionError> {
        let session_id = require_session_id(session_id)?;
        self.with_deadline("end", async {
            self.gate
                .protect("end_session", || {
                    self.session_repo.end_session(session_id, Utc::now())
                })
                .await?;
            Ok(())
        })
        .await
    }

    async fn authorize(
        &self,
        claim: SessionClaim,
        now: DateTime<Utc>,
    ) -> Result<NewSessionModel, SessionError> {
        let fingerprint = claim.machine_fingerprint.trim();
        if fingerprint.is_empty() {
            return Err(ValidationError::MissingRequiredFields.into());
        }
        let session_id = require_session_id(&claim.session_id)?.to_string();

        let customer = self
            .gate
            .authenticate(&claim.email, &claim.unlock_credential)
            .await?;
        self.gate.require_entitled(&customer, now)?;

        Ok(NewSessionModel {
            customer_id: customer.id,
            session_id,
            machine_identity_hash: self.hasher.hash(fingerprint),
            device_info: claim.device_info.unwrap_or(Value::Null),
        })
    }

    async fn with_deadline<T, Fut>(&self, operation: &'static str, fut: Fut) -> Result<T, SessionError>
    where
        Fut: Future<Output = Result<T, SessionError>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.request_timeout.as_millis() as u64, "sessions: request timed out");
                Err(ValidationError::SystemDegraded.into())
            }
        }
    }
}

fn require_session_id(session_id: &str) -> Result<&str, SessionError> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(SessionError::MissingSessionId);
    }
    Ok(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use crates::{
        domain::{
            entities::customers::CustomerEntity,
            repositories::{
                active_sessions::MockActiveSessionRepository,
                customers::MockCustomerRepository,
            },
            value_objects::{
                enums::subscription_statuses::SubscriptionStatus,
                sessions::SessionConflict,
                subscriptions::CancellationPolicy,
            },
        },
        resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
    };
    use serde_json::json;
    use uuid::Uuid;

    fn customer(status: SubscriptionStatus) -> CustomerEntity {
        let now = Utc::now();
        CustomerEntity {
            id: Uuid::new_v4(),
            email: "owner@cafe.test".to_string(),
            name: None,
            unlock_credential: "POS-AAAA-BBBB-CCCC-DDDD".to_string(),
            billing_customer_ref: Some("cus_1".to_string()),
            billing_subscription_ref: Some("sub_1".to_string()),
            status: status.to_string(),
            current_period_start: None,
            current_period_end: None,
            next_billing_date: None,
            machine_identity_hash: None,
            last_seen: Some(now - ChronoDuration::days(3)),
            last_validation: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn customer_repo(status: SubscriptionStatus) -> MockCustomerRepository {
        let mut repo = MockCustomerRepository::new();
        let found = customer(status);
        repo.expect_find_by_credentials().returning(move |_, _| {
            let found = found.clone();
            Box::pin(async move { Ok(Some(found)) })
        });
        repo
    }

    fn arbiter(
        customers: MockCustomerRepository,
        sessions: MockActiveSessionRepository,
    ) -> SessionArbiterUseCase<MockCustomerRepository, MockActiveSessionRepository> {
        let gate = LicenseGate::new(
            Arc::new(customers),
            Arc::new(CircuitBreaker::new("license-store", CircuitBreakerConfig::default())),
            CancellationPolicy::Immediate,
            "support@pos.test".to_string(),
        );
        SessionArbiterUseCase::new(
            Arc::new(gate),
            Arc::new(sessions),
            MachineHasher::new("machine-secret").unwrap(),
            Duration::from_secs(2),
        )
    }

    fn claim(session_id: &str) -> SessionClaim {
        SessionClaim {
            email: "Owner@Cafe.test".to_string(),
            unlock_credential: "POS-AAAA-BBBB-CCCC-DDDD".to_string(),
            machine_fingerprint: "cpu:1".to_string(),
            session_id: session_id.to_string(),
            device_info: Some(json!({ "name": "Till 1" })),
        }
    }

    #[tokio::test]
    async fn start_passes_hashed_identity_to_store() {
        let mut sessions = MockActiveSessionRepository::new();
        sessions
            .expect_start_session()
            .times(1)
            .returning(|new_session, _| {
                assert_eq!(new_session.session_id, "till-1");
                assert_ne!(new_session.machine_identity_hash, "cpu:1");
                assert_eq!(new_session.device_info, json!({ "name": "Till 1" }));
                Box::pin(async { Ok(SessionStartOutcome::Granted) })
            });

        let outcome = arbiter(customer_repo(SubscriptionStatus::Active), sessions)
            .start(claim("till-1"))
            .await
            .unwrap();

        assert_eq!(outcome, SessionStartOutcome::Granted);
    }

    #[tokio::test]
    async fn start_reports_conflict() {
        let last_seen = Utc::now();
        let mut sessions = MockActiveSessionRepository::new();
        sessions.expect_start_session().returning(move |_, _| {
            Box::pin(async move {
                Ok(SessionStartOutcome::Conflict(SessionConflict {
                    device_info: json!({ "name": "Till 2" }),
                    last_seen,
                }))
            })
        });

        let outcome = arbiter(customer_repo(SubscriptionStatus::Active), sessions)
            .start(claim("till-1"))
            .await
            .unwrap();

        assert!(matches!(outcome, SessionStartOutcome::Conflict(c) if c.last_seen == last_seen));
    }

    #[tokio::test]
    async fn inactive_customer_cannot_take_over() {
        let mut sessions = MockActiveSessionRepository::new();
        sessions.expect_takeover_session().never();

        let err = arbiter(customer_repo(SubscriptionStatus::Inactive), sessions)
            .takeover(claim("till-1"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn takeover_returns_new_session_id() {
        let mut sessions = MockActiveSessionRepository::new();
        sessions
            .expect_takeover_session()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(TakeoverOutcome::Granted { kicked: 1 }) }));

        let session_id = arbiter(customer_repo(SubscriptionStatus::Active), sessions)
            .takeover(claim(" till-9 "))
            .await
            .unwrap();

        assert_eq!(session_id, "till-9");
    }

    #[tokio::test]
    async fn takeover_of_foreign_session_id_is_refused() {
        let mut sessions = MockActiveSessionRepository::new();
        sessions
            .expect_takeover_session()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(TakeoverOutcome::SessionIdTaken) }));

        let err = arbiter(customer_repo(SubscriptionStatus::Active), sessions)
            .takeover(claim("till-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::SessionIdTaken));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn blank_session_id_is_rejected() {
        let err = arbiter(MockCustomerRepository::new(), MockActiveSessionRepository::new())
            .heartbeat("   ")
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::MissingSessionId));
    }

    #[tokio::test]
    async fn heartbeat_surfaces_kicked() {
        let mut sessions = MockActiveSessionRepository::new();
        sessions.expect_heartbeat().returning(|session_id, _| {
            assert_eq!(session_id, "till-1");
            Box::pin(async { Ok(HeartbeatOutcome::Kicked) })
        });

        let outcome = arbiter(MockCustomerRepository::new(), sessions)
            .heartbeat("till-1")
            .await
            .unwrap();

        assert_eq!(outcome, HeartbeatOutcome::Kicked);
    }

    #[tokio::test]
    async fn store_failure_on_end_is_degraded() {
        let mut sessions = MockActiveSessionRepository::new();
        sessions
            .expect_end_session()
            .returning(|_, _| Box::pin(async { Err(anyhow::anyhow!("connection reset")) }));

        let err = arbiter(MockCustomerRepository::new(), sessions)
            .end("till-1")
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Validation(ValidationError::SystemDegraded)));
        assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }
}
