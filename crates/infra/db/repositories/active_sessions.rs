use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{active_sessions, customers},
    },
};
use domain::{
    entities::active_sessions::{ActiveSessionEntity, InsertActiveSessionEntity},
    repositories::active_sessions::ActiveSessionRepository,
    value_objects::{
        enums::session_statuses::SessionStatus,
        sessions::{
            HeartbeatOutcome, NewSessionModel, SessionConflict, SessionStartOutcome,
            TakeoverOutcome, find_blocking_session,
        },
    },
};

pub struct ActiveSessionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ActiveSessionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Serialises start/takeover per customer for the rest of the transaction.
fn lock_customer(conn: &mut PgConnection, customer_id: Uuid) -> Result<()> {
    customers::table
        .find(customer_id)
        .select(customers::id)
        .for_update()
        .first::<Uuid>(conn)
        .optional()?
        .ok_or_else(|| anyhow!("customer {customer_id} not found"))?;

    Ok(())
}

fn session_id_taken(conn: &mut PgConnection, new_session: &NewSessionModel) -> Result<bool> {
    let owner = active_sessions::table
        .filter(active_sessions::session_id.eq(&new_session.session_id))
        .select(active_sessions::customer_id)
        .first::<Uuid>(conn)
        .optional()?;

    Ok(owner.is_some_and(|owner| owner != new_session.customer_id))
}

/// Only ever refreshes a row owned by the same customer.
fn upsert_own_session(
    conn: &mut PgConnection,
    new_session: &NewSessionModel,
    now: DateTime<Utc>,
) -> Result<()> {
    let insert_entity = InsertActiveSessionEntity {
        customer_id: new_session.customer_id,
        session_id: new_session.session_id.clone(),
        machine_identity_hash: new_session.machine_identity_hash.clone(),
        device_info: new_session.device_info.clone(),
        status: SessionStatus::Active.to_string(),
        last_heartbeat: now,
    };

    use diesel::query_dsl::methods::FilterDsl;

    let affected = insert_into(active_sessions::table)
        .values(&insert_entity)
        .on_conflict(active_sessions::session_id)
        .do_update()
        .set((
            active_sessions::machine_identity_hash.eq(&insert_entity.machine_identity_hash),
            active_sessions::device_info.eq(&insert_entity.device_info),
            active_sessions::status.eq(SessionStatus::Active.as_str()),
            active_sessions::last_heartbeat.eq(now),
            active_sessions::updated_at.eq(now),
        ))
        .filter(active_sessions::customer_id.eq(new_session.customer_id))
        .execute(conn)?;

    // Another customer claimed the id after the ownership check; roll back.
    if affected == 0 {
        return Err(anyhow!(
            "session {} is owned by another customer",
            new_session.session_id
        ));
    }

    Ok(())
}

#[async_trait]
impl ActiveSessionRepository for ActiveSessionPostgres {
    async fn start_session(
        &self,
        new_session: NewSessionModel,
        now: DateTime<Utc>,
    ) -> Result<SessionStartOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<SessionStartOutcome, anyhow::Error, _>(|conn| {
            lock_customer(conn, new_session.customer_id)?;

            if session_id_taken(conn, &new_session)? {
                return Ok(SessionStartOutcome::SessionIdTaken);
            }

            let sessions = active_sessions::table
                .filter(active_sessions::customer_id.eq(new_session.customer_id))
                .filter(active_sessions::status.eq(SessionStatus::Active.as_str()))
                .select(ActiveSessionEntity::as_select())
                .load::<ActiveSessionEntity>(conn)?;

            if let Some(blocking) = find_blocking_session(&sessions, &new_session.session_id, now) {
                return Ok(SessionStartOutcome::Conflict(SessionConflict {
                    device_info: blocking.device_info.clone(),
                    last_seen: blocking.last_heartbeat,
                }));
            }

            // Stale rows left by other devices are closed so a late heartbeat
            // cannot revive them alongside this session.
            update(active_sessions::table)
                .filter(active_sessions::customer_id.eq(new_session.customer_id))
                .filter(active_sessions::status.eq(SessionStatus::Active.as_str()))
                .filter(active_sessions::session_id.ne(&new_session.session_id))
                .set((
                    active_sessions::status.eq(SessionStatus::Ended.as_str()),
                    active_sessions::updated_at.eq(now),
                ))
                .execute(conn)?;

            upsert_own_session(conn, &new_session, now)?;

            Ok(SessionStartOutcome::Granted)
        })
    }

    async fn takeover_session(
        &self,
        new_session: NewSessionModel,
        now: DateTime<Utc>,
    ) -> Result<TakeoverOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<TakeoverOutcome, anyhow::Error, _>(|conn| {
            lock_customer(conn, new_session.customer_id)?;

            if session_id_taken(conn, &new_session)? {
                return Ok(TakeoverOutcome::SessionIdTaken);
            }

            let kicked = update(active_sessions::table)
                .filter(active_sessions::customer_id.eq(new_session.customer_id))
                .filter(active_sessions::status.eq(SessionStatus::Active.as_str()))
                .filter(active_sessions::session_id.ne(&new_session.session_id))
                .set((
                    active_sessions::status.eq(SessionStatus::Kicked.as_str()),
                    active_sessions::updated_at.eq(now),
                ))
                .execute(conn)?;

            upsert_own_session(conn, &new_session, now)?;

            Ok(TakeoverOutcome::Granted { kicked })
        })
    }

    async fn heartbeat(&self, session_id: &str, now: DateTime<Utc>) -> Result<HeartbeatOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let refreshed = update(active_sessions::table)
            .filter(active_sessions::session_id.eq(session_id))
            .filter(active_sessions::status.eq(SessionStatus::Active.as_str()))
            .set((
                active_sessions::last_heartbeat.eq(now),
                active_sessions::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        if refreshed > 0 {
            return Ok(HeartbeatOutcome::Ok);
        }

        let status = active_sessions::table
            .filter(active_sessions::session_id.eq(session_id))
            .select(active_sessions::status)
            .first::<String>(&mut conn)
            .optional()?;

        Ok(match status.as_deref().map(SessionStatus::from_str) {
            Some(SessionStatus::Kicked) => HeartbeatOutcome::Kicked,
            _ => HeartbeatOutcome::NotFound,
        })
    }

    async fn end_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(active_sessions::table)
            .filter(active_sessions::session_id.eq(session_id))
            .filter(active_sessions::status.eq(SessionStatus::Active.as_str()))
            .set((
                active_sessions::status.eq(SessionStatus::Ended.as_str()),
                active_sessions::updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
