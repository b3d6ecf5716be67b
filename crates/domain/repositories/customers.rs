use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::customers::{
    CustomerEntity, InsertCustomerEntity, UpdateBillingStateEntity,
};

#[async_trait]
#[automock]
pub trait CustomerRepository {
    async fn find_by_id(&self, customer_id: Uuid) -> Result<Option<CustomerEntity>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<CustomerEntity>>;

    /// Both values must match; a miss never reveals which one was wrong.
    async fn find_by_credentials(
        &self,
        email: &str,
        unlock_credential: &str,
    ) -> Result<Option<CustomerEntity>>;

    /// Subscription ref first, customer ref as the fallback.
    async fn find_by_billing_refs(
        &self,
        billing_subscription_ref: Option<String>,
        billing_customer_ref: Option<String>,
    ) -> Result<Option<CustomerEntity>>;

    async fn insert_customer(&self, insert_entity: InsertCustomerEntity) -> Result<CustomerEntity>;

    async fn update_billing_state(
        &self,
        customer_id: Uuid,
        changes: UpdateBillingStateEntity,
    ) -> Result<CustomerEntity>;

    /// Stamps `last_seen`/`last_validation`, and the machine hash when given.
    async fn record_validation(
        &self,
        customer_id: Uuid,
        machine_identity_hash: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn set_billing_customer_ref(
        &self,
        customer_id: Uuid,
        billing_customer_ref: &str,
    ) -> Result<()>;
}
