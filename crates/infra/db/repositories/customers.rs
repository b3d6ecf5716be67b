use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::customers},
};
use domain::{
    entities::customers::{CustomerEntity, InsertCustomerEntity, UpdateBillingStateEntity},
    repositories::customers::CustomerRepository,
};

pub struct CustomerPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CustomerPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CustomerRepository for CustomerPostgres {
    async fn find_by_id(&self, customer_id: Uuid) -> Result<Option<CustomerEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = customers::table
            .find(customer_id)
            .select(CustomerEntity::as_select())
            .first::<CustomerEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<CustomerEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = customers::table
            .filter(customers::email.eq(email))
            .select(CustomerEntity::as_select())
            .first::<CustomerEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_by_credentials(
        &self,
        email: &str,
        unlock_credential: &str,
    ) -> Result<Option<CustomerEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = customers::table
            .filter(customers::email.eq(email))
            .filter(customers::unlock_credential.eq(unlock_credential))
            .select(CustomerEntity::as_select())
            .first::<CustomerEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_by_billing_refs(
        &self,
        billing_subscription_ref: Option<String>,
        billing_customer_ref: Option<String>,
    ) -> Result<Option<CustomerEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        if let Some(subscription_ref) = billing_subscription_ref.as_deref() {
            let by_subscription = customers::table
                .filter(customers::billing_subscription_ref.eq(subscription_ref))
                .select(CustomerEntity::as_select())
                .first::<CustomerEntity>(&mut conn)
                .optional()?;

            if by_subscription.is_some() {
                return Ok(by_subscription);
            }
        }

        let Some(customer_ref) = billing_customer_ref.as_deref() else {
            return Ok(None);
        };

        let by_customer = customers::table
            .filter(customers::billing_customer_ref.eq(customer_ref))
            .order(customers::updated_at.desc())
            .select(CustomerEntity::as_select())
            .first::<CustomerEntity>(&mut conn)
            .optional()?;

        Ok(by_customer)
    }

    async fn insert_customer(&self, insert_entity: InsertCustomerEntity) -> Result<CustomerEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = insert_into(customers::table)
            .values(&insert_entity)
            .returning(CustomerEntity::as_returning())
            .get_result::<CustomerEntity>(&mut conn)?;

        Ok(result)
    }

    async fn update_billing_state(
        &self,
        customer_id: Uuid,
        changes: UpdateBillingStateEntity,
    ) -> Result<CustomerEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let changes = UpdateBillingStateEntity {
            updated_at: Some(changes.updated_at.unwrap_or_else(Utc::now)),
            ..changes
        };

        let result = update(customers::table.find(customer_id))
            .set(&changes)
            .returning(CustomerEntity::as_returning())
            .get_result::<CustomerEntity>(&mut conn)?;

        Ok(result)
    }

    async fn record_validation(
        &self,
        customer_id: Uuid,
        machine_identity_hash: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let target = customers::table.find(customer_id);

        match machine_identity_hash {
            Some(hash) => {
                update(target)
                    .set((
                        customers::machine_identity_hash.eq(Some(hash)),
                        customers::last_seen.eq(Some(at)),
                        customers::last_validation.eq(Some(at)),
                        customers::updated_at.eq(at),
                    ))
                    .execute(&mut conn)?;
            }
            None => {
                update(target)
                    .set((
                        customers::last_seen.eq(Some(at)),
                        customers::last_validation.eq(Some(at)),
                        customers::updated_at.eq(at),
                    ))
                    .execute(&mut conn)?;
            }
        }

        Ok(())
    }

    async fn set_billing_customer_ref(
        &self,
        customer_id: Uuid,
        billing_customer_ref: &str,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(customers::table.find(customer_id))
            .set((
                customers::billing_customer_ref.eq(Some(billing_customer_ref)),
                customers::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
