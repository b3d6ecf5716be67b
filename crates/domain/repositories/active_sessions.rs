use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use crate::domain::value_objects::sessions::{
    HeartbeatOutcome, NewSessionModel, SessionStartOutcome, TakeoverOutcome,
};

#[async_trait]
#[automock]
pub trait ActiveSessionRepository {
    /// Serialised per customer. Grants unless another live session exists.
    async fn start_session(
        &self,
        new_session: NewSessionModel,
        now: DateTime<Utc>,
    ) -> Result<SessionStartOutcome>;

    /// Kicks every other live session of the customer and activates this one.
    /// A session id owned by another customer is never reassigned.
    async fn takeover_session(
        &self,
        new_session: NewSessionModel,
        now: DateTime<Utc>,
    ) -> Result<TakeoverOutcome>;

    async fn heartbeat(&self, session_id: &str, now: DateTime<Utc>) -> Result<HeartbeatOutcome>;

    /// Idempotent.
    async fn end_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()>;
}
