use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::infra::db::postgres::schema::customers;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = customers)]
pub struct CustomerEntity {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub unlock_credential: String,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub machine_identity_hash: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_validation: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerEntity {
    pub fn subscription_status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = customers)]
pub struct InsertCustomerEntity {
    pub email: String,
    pub name: Option<String>,
    pub unlock_credential: String,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_validation: Option<DateTime<Utc>>,
}

/// Billing-side changes to a customer. `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = customers)]
pub struct UpdateBillingStateEntity {
    pub name: Option<String>,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
    pub status: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
