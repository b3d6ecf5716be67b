use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::entities::active_sessions::ActiveSessionEntity;

/// A session whose heartbeat is older than this is free capacity.
pub const HEARTBEAT_TIMEOUT_SECS: i64 = 120;

pub fn heartbeat_timeout() -> Duration {
    Duration::seconds(HEARTBEAT_TIMEOUT_SECS)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSessionModel {
    pub customer_id: Uuid,
    pub session_id: String,
    pub machine_identity_hash: String,
    pub device_info: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConflict {
    pub device_info: Value,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStartOutcome {
    Granted,
    Conflict(SessionConflict),
    /// The session id is already registered to another customer.
    SessionIdTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeoverOutcome {
    Granted { kicked: usize },
    SessionIdTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Ok,
    NotFound,
    Kicked,
}

/// First live session of the customer that belongs to a different device session.
pub fn find_blocking_session<'a>(
    sessions: &'a [ActiveSessionEntity],
    session_id: &str,
    now: DateTime<Utc>,
) -> Option<&'a ActiveSessionEntity> {
    sessions
        .iter()
        .filter(|session| session.session_id != session_id)
        .filter(|session| session.is_live(now))
        .max_by_key(|session| session.last_heartbeat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::enums::session_statuses::SessionStatus;
    use serde_json::json;

    fn session(session_id: &str, status: SessionStatus, heartbeat_age_secs: i64, now: DateTime<Utc>) -> ActiveSessionEntity {
        ActiveSessionEntity {
            id: Uuid::new_v4(),
            customer_id: Uuid::nil(),
            session_id: session_id.to_string(),
            machine_identity_hash: "hash".to_string(),
            device_info: json!({ "name": session_id }),
            status: status.to_string(),
            last_heartbeat: now - Duration::seconds(heartbeat_age_secs),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn live_session_of_another_device_blocks() {
        let now = Utc::now();
        let sessions = vec![session("a", SessionStatus::Active, 30, now)];

        let blocking = find_blocking_session(&sessions, "b", now).unwrap();
        assert_eq!(blocking.session_id, "a");
    }

    #[test]
    fn own_session_never_blocks() {
        let now = Utc::now();
        let sessions = vec![session("a", SessionStatus::Active, 30, now)];

        assert!(find_blocking_session(&sessions, "a", now).is_none());
    }

    #[test]
    fn stale_ended_and_kicked_sessions_are_free_capacity() {
        let now = Utc::now();
        let sessions = vec![
            session("stale", SessionStatus::Active, HEARTBEAT_TIMEOUT_SECS, now),
            session("ended", SessionStatus::Ended, 5, now),
            session("kicked", SessionStatus::Kicked, 5, now),
        ];

        assert!(find_blocking_session(&sessions, "new", now).is_none());
    }
}
