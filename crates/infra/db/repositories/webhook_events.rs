use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::webhook_events},
};
use domain::{
    entities::webhook_events::{InsertWebhookEventEntity, WebhookEventEntity},
    repositories::webhook_events::WebhookEventRepository,
    value_objects::{
        enums::webhook_processing_statuses::WebhookProcessingStatus, webhook_events::EventClaim,
    },
};

pub struct WebhookEventPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl WebhookEventPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

fn classify_existing(status: WebhookProcessingStatus) -> EventClaim {
    match status {
        WebhookProcessingStatus::Completed => EventClaim::AlreadyCompleted,
        // A failed row that could not be re-claimed here was taken by another delivery.
        WebhookProcessingStatus::Processing | WebhookProcessingStatus::Failed => {
            EventClaim::InProgress
        }
    }
}

#[async_trait]
impl WebhookEventRepository for WebhookEventPostgres {
    async fn claim_event(&self, external_event_id: &str, event_type: &str) -> Result<EventClaim> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let existing = webhook_events::table
            .filter(webhook_events::external_event_id.eq(external_event_id))
            .select(WebhookEventEntity::as_select())
            .first::<WebhookEventEntity>(&mut conn)
            .optional()?;

        match existing.as_ref().map(WebhookEventEntity::processing_status) {
            Some(WebhookProcessingStatus::Completed) => return Ok(EventClaim::AlreadyCompleted),
            Some(WebhookProcessingStatus::Processing) => return Ok(EventClaim::InProgress),
            Some(WebhookProcessingStatus::Failed) => {
                // Only one re-delivery wins the conditional flip back to processing.
                let reclaimed = update(webhook_events::table)
                    .filter(webhook_events::external_event_id.eq(external_event_id))
                    .filter(
                        webhook_events::processing_status
                            .eq(WebhookProcessingStatus::Failed.as_str()),
                    )
                    .set((
                        webhook_events::processing_status
                            .eq(WebhookProcessingStatus::Processing.as_str()),
                        webhook_events::attempts.eq(webhook_events::attempts + 1),
                        webhook_events::error.eq(None::<String>),
                        webhook_events::updated_at.eq(Utc::now()),
                    ))
                    .returning((webhook_events::id, webhook_events::attempts))
                    .get_result::<(Uuid, i32)>(&mut conn)
                    .optional()?;

                return Ok(match reclaimed {
                    Some((event_row_id, attempt)) => EventClaim::Claimed {
                        event_row_id,
                        attempt,
                    },
                    None => EventClaim::InProgress,
                });
            }
            None => {}
        }

        let insert_entity = InsertWebhookEventEntity {
            external_event_id: external_event_id.to_string(),
            event_type: event_type.to_string(),
            processing_status: WebhookProcessingStatus::Processing.to_string(),
            attempts: 1,
        };

        let inserted = insert_into(webhook_events::table)
            .values(&insert_entity)
            .on_conflict(webhook_events::external_event_id)
            .do_nothing()
            .returning(webhook_events::id)
            .get_result::<Uuid>(&mut conn)
            .optional()?;

        if let Some(event_row_id) = inserted {
            return Ok(EventClaim::Claimed {
                event_row_id,
                attempt: 1,
            });
        }

        // Lost the insert race; the winner's row decides.
        let status = webhook_events::table
            .filter(webhook_events::external_event_id.eq(external_event_id))
            .select(webhook_events::processing_status)
            .first::<String>(&mut conn)?;

        Ok(classify_existing(WebhookProcessingStatus::from_str(&status)))
    }

    async fn mark_completed(
        &self,
        event_row_id: Uuid,
        associated_customer_id: Option<Uuid>,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(webhook_events::table.find(event_row_id))
            .set((
                webhook_events::processing_status.eq(WebhookProcessingStatus::Completed.as_str()),
                webhook_events::associated_customer_id.eq(associated_customer_id),
                webhook_events::error.eq(None::<String>),
                webhook_events::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn mark_failed(&self, event_row_id: Uuid, error: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(webhook_events::table.find(event_row_id))
            .set((
                webhook_events::processing_status.eq(WebhookProcessingStatus::Failed.as_str()),
                webhook_events::error.eq(Some(error)),
                webhook_events::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
