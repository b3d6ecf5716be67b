use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::value_objects::enums::session_statuses::SessionStatus;
use crate::domain::value_objects::sessions::heartbeat_timeout;
use crate::infra::db::postgres::schema::active_sessions;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = active_sessions)]
pub struct ActiveSessionEntity {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub session_id: String,
    pub machine_identity_hash: String,
    pub device_info: Value,
    pub status: String,
    pub last_heartbeat: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveSessionEntity {
    pub fn session_status(&self) -> SessionStatus {
        SessionStatus::from_str(&self.status)
    }

    /// Liveness is decided at read time; stale rows are never swept.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.session_status() == SessionStatus::Active
            && now.signed_duration_since(self.last_heartbeat) < heartbeat_timeout()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = active_sessions)]
pub struct InsertActiveSessionEntity {
    pub customer_id: Uuid,
    pub session_id: String,
    pub machine_identity_hash: String,
    pub device_info: Value,
    pub status: String,
    pub last_heartbeat: DateTime<Utc>,
}
