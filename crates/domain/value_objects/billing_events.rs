use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";
pub const CUSTOMER_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BillingEventParseError {
    #[error("{event_type} payload is missing `{field}`")]
    MissingField {
        event_type: String,
        field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub checkout_session_id: String,
    pub email: String,
    pub name: Option<String>,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceEvent {
    pub invoice_id: String,
    pub billing_customer_ref: Option<String>,
    pub billing_subscription_ref: Option<String>,
    pub period: Option<BillingPeriod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDeleted {
    pub billing_subscription_ref: String,
    pub billing_customer_ref: Option<String>,
    pub period: Option<BillingPeriod>,
}

/// A Stripe event narrowed to the variants that move subscription state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutCompleted),
    InvoicePaymentSucceeded(InvoiceEvent),
    InvoicePaymentFailed(InvoiceEvent),
    SubscriptionDeleted(SubscriptionDeleted),
    Unsupported { event_type: String },
}

impl BillingEvent {
    /// `object` is the `data.object` of the Stripe envelope.
    pub fn parse(event_type: &str, object: &Value) -> Result<Self, BillingEventParseError> {
        let missing = |field: &'static str| BillingEventParseError::MissingField {
            event_type: event_type.to_string(),
            field,
        };

        match event_type {
            CHECKOUT_SESSION_COMPLETED => {
                let checkout_session_id = string_at(object, &["id"]).ok_or_else(|| missing("id"))?;
                let email = string_at(object, &["customer_details", "email"])
                    .or_else(|| string_at(object, &["customer_email"]))
                    .ok_or_else(|| missing("customer_details.email"))?;

                Ok(BillingEvent::CheckoutCompleted(CheckoutCompleted {
                    checkout_session_id,
                    email,
                    name: string_at(object, &["customer_details", "name"]),
                    billing_customer_ref: string_at(object, &["customer"]),
                    billing_subscription_ref: string_at(object, &["subscription"]),
                }))
            }
            // `invoice.paid` fires for the same payment under another event id; only
            // this one is handled so a renewal is applied once.
            INVOICE_PAYMENT_SUCCEEDED => {
                Ok(BillingEvent::InvoicePaymentSucceeded(parse_invoice(object).ok_or_else(|| missing("id"))?))
            }
            INVOICE_PAYMENT_FAILED => {
                Ok(BillingEvent::InvoicePaymentFailed(parse_invoice(object).ok_or_else(|| missing("id"))?))
            }
            CUSTOMER_SUBSCRIPTION_DELETED => {
                let billing_subscription_ref = string_at(object, &["id"]).ok_or_else(|| missing("id"))?;
                let period = period_from(
                    object,
                    &["current_period_start"],
                    &["current_period_end"],
                )
                .or_else(|| {
                    first_item(object, &["items", "data"]).and_then(|item| {
                        period_from(item, &["current_period_start"], &["current_period_end"])
                    })
                });

                Ok(BillingEvent::SubscriptionDeleted(SubscriptionDeleted {
                    billing_subscription_ref,
                    billing_customer_ref: string_at(object, &["customer"]),
                    period,
                }))
            }
            other => Ok(BillingEvent::Unsupported {
                event_type: other.to_string(),
            }),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted(_) => CHECKOUT_SESSION_COMPLETED,
            BillingEvent::InvoicePaymentSucceeded(_) => INVOICE_PAYMENT_SUCCEEDED,
            BillingEvent::InvoicePaymentFailed(_) => INVOICE_PAYMENT_FAILED,
            BillingEvent::SubscriptionDeleted(_) => CUSTOMER_SUBSCRIPTION_DELETED,
            BillingEvent::Unsupported { event_type } => event_type,
        }
    }
}

fn parse_invoice(object: &Value) -> Option<InvoiceEvent> {
    let invoice_id = string_at(object, &["id"])?;

    // Newer API versions moved the subscription id under `parent`.
    let billing_subscription_ref = string_at(object, &["subscription"]).or_else(|| {
        string_at(object, &["parent", "subscription_details", "subscription"])
    });

    let period = first_item(object, &["lines", "data"])
        .and_then(|line| period_from(line, &["period", "start"], &["period", "end"]));

    Some(InvoiceEvent {
        invoice_id,
        billing_customer_ref: string_at(object, &["customer"]),
        billing_subscription_ref,
        period,
    })
}

fn value_at<'a>(object: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(object, |current, key| current.get(key))
}

fn string_at(object: &Value, path: &[&str]) -> Option<String> {
    value_at(object, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn first_item<'a>(object: &'a Value, path: &[&str]) -> Option<&'a Value> {
    value_at(object, path)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
}

fn timestamp_at(object: &Value, path: &[&str]) -> Option<DateTime<Utc>> {
    value_at(object, path)
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

fn period_from(object: &Value, start: &[&str], end: &[&str]) -> Option<BillingPeriod> {
    Some(BillingPeriod {
        start: timestamp_at(object, start)?,
        end: timestamp_at(object, end)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checkout_reads_customer_details() {
        let object = json!({
            "id": "cs_test_1",
            "customer": "cus_1",
            "subscription": "sub_1",
            "customer_details": { "email": "owner@cafe.test", "name": "Cafe Owner" }
        });

        let event = BillingEvent::parse(CHECKOUT_SESSION_COMPLETED, &object).unwrap();

        assert_eq!(
            event,
            BillingEvent::CheckoutCompleted(CheckoutCompleted {
                checkout_session_id: "cs_test_1".to_string(),
                email: "owner@cafe.test".to_string(),
                name: Some("Cafe Owner".to_string()),
                billing_customer_ref: Some("cus_1".to_string()),
                billing_subscription_ref: Some("sub_1".to_string()),
            })
        );
    }

    #[test]
    fn checkout_without_email_is_rejected() {
        let object = json!({ "id": "cs_test_2", "customer_details": {} });

        let err = BillingEvent::parse(CHECKOUT_SESSION_COMPLETED, &object).unwrap_err();

        assert_eq!(
            err,
            BillingEventParseError::MissingField {
                event_type: CHECKOUT_SESSION_COMPLETED.to_string(),
                field: "customer_details.email",
            }
        );
    }

    #[test]
    fn payment_succeeded_reads_line_period() {
        let object = json!({
            "id": "in_1",
            "customer": "cus_1",
            "subscription": "sub_1",
            "lines": { "data": [ { "period": { "start": 1_700_000_000, "end": 1_702_592_000 } } ] }
        });

        let event = BillingEvent::parse(INVOICE_PAYMENT_SUCCEEDED, &object).unwrap();

        let BillingEvent::InvoicePaymentSucceeded(invoice) = event else {
            panic!("expected payment succeeded, got {event:?}");
        };
        assert_eq!(invoice.billing_subscription_ref.as_deref(), Some("sub_1"));
        let period = invoice.period.unwrap();
        assert_eq!(period.start.timestamp(), 1_700_000_000);
        assert_eq!(period.end.timestamp(), 1_702_592_000);
    }

    #[test]
    fn invoice_paid_twin_is_not_applied_a_second_time() {
        let object = json!({ "id": "in_1", "customer": "cus_1", "subscription": "sub_1" });

        assert_eq!(
            BillingEvent::parse("invoice.paid", &object).unwrap(),
            BillingEvent::Unsupported {
                event_type: "invoice.paid".to_string()
            }
        );
    }

    #[test]
    fn invoice_subscription_falls_back_to_parent_details() {
        let object = json!({
            "id": "in_2",
            "customer": "cus_2",
            "parent": { "subscription_details": { "subscription": "sub_2" } }
        });

        let BillingEvent::InvoicePaymentFailed(invoice) =
            BillingEvent::parse(INVOICE_PAYMENT_FAILED, &object).unwrap()
        else {
            panic!("expected payment failed");
        };
        assert_eq!(invoice.billing_subscription_ref.as_deref(), Some("sub_2"));
        assert_eq!(invoice.period, None);
    }

    #[test]
    fn subscription_deleted_reads_item_period() {
        let object = json!({
            "id": "sub_3",
            "customer": "cus_3",
            "items": { "data": [ { "current_period_start": 10, "current_period_end": 20 } ] }
        });

        let BillingEvent::SubscriptionDeleted(deleted) =
            BillingEvent::parse(CUSTOMER_SUBSCRIPTION_DELETED, &object).unwrap()
        else {
            panic!("expected subscription deleted");
        };
        assert_eq!(deleted.billing_subscription_ref, "sub_3");
        assert_eq!(deleted.period.map(|p| p.end.timestamp()), Some(20));
    }

    #[test]
    fn unknown_types_are_unsupported() {
        let event = BillingEvent::parse("customer.updated", &json!({})).unwrap();

        assert_eq!(
            event,
            BillingEvent::Unsupported {
                event_type: "customer.updated".to_string()
            }
        );
        assert_eq!(event.kind(), "customer.updated");
    }
}
