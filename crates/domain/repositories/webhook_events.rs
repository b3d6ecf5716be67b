use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::webhook_events::EventClaim;

#[async_trait]
#[automock]
pub trait WebhookEventRepository {
    /// Atomically records the event as `processing`, or reports who already has it.
    /// A `failed` row is re-claimed by exactly one caller.
    async fn claim_event(&self, external_event_id: &str, event_type: &str) -> Result<EventClaim>;

    async fn mark_completed(
        &self,
        event_row_id: Uuid,
        associated_customer_id: Option<Uuid>,
    ) -> Result<()>;

    async fn mark_failed(&self, event_row_id: Uuid, error: &str) -> Result<()>;
}
