use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::value_objects::enums::webhook_processing_statuses::WebhookProcessingStatus;
use crate::infra::db::postgres::schema::webhook_events;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = webhook_events)]
pub struct WebhookEventEntity {
    pub id: Uuid,
    pub external_event_id: String,
    pub event_type: String,
    pub processing_status: String,
    pub associated_customer_id: Option<Uuid>,
    pub error: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEventEntity {
    pub fn processing_status(&self) -> WebhookProcessingStatus {
        WebhookProcessingStatus::from_str(&self.processing_status)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_events)]
pub struct InsertWebhookEventEntity {
    pub external_event_id: String,
    pub event_type: String,
    pub processing_status: String,
    pub attempts: i32,
}
