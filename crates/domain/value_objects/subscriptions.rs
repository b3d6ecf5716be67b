use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

/// What a billing event asserts about the subscription, independent of Stripe naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingSignal {
    PaymentSucceeded,
    PaymentFailed,
    Deleted,
}

impl BillingSignal {
    fn implied_status(&self) -> SubscriptionStatus {
        match self {
            BillingSignal::PaymentSucceeded => SubscriptionStatus::Active,
            BillingSignal::PaymentFailed => SubscriptionStatus::Inactive,
            BillingSignal::Deleted => SubscriptionStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusNotice {
    Welcome,
    Reactivated,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    pub next: SubscriptionStatus,
    /// False when the event must leave the record untouched.
    pub apply: bool,
    pub notice: Option<StatusNotice>,
}

/// No grace state: the first failed payment suspends, the first successful one reactivates.
///
/// `authoritative` is the status freshly fetched from the billing processor; when present
/// it wins over the status the event implies.
pub fn plan_transition(
    current: SubscriptionStatus,
    signal: BillingSignal,
    authoritative: Option<SubscriptionStatus>,
) -> TransitionPlan {
    if current == SubscriptionStatus::Cancelled {
        // Only a new checkout revives a cancelled record.
        return TransitionPlan {
            next: current,
            apply: false,
            notice: None,
        };
    }

    let next = authoritative.unwrap_or_else(|| signal.implied_status());

    TransitionPlan {
        next,
        apply: true,
        notice: notice_for(current, next),
    }
}

/// Checkout either creates the record or revives the one already keyed to the email.
pub fn plan_checkout(existing: Option<SubscriptionStatus>) -> TransitionPlan {
    let notice = match existing {
        None => Some(StatusNotice::Welcome),
        Some(SubscriptionStatus::Active) => None,
        Some(SubscriptionStatus::Inactive | SubscriptionStatus::Cancelled) => {
            Some(StatusNotice::Reactivated)
        }
    };

    TransitionPlan {
        next: SubscriptionStatus::Active,
        apply: true,
        notice,
    }
}

fn notice_for(previous: SubscriptionStatus, next: SubscriptionStatus) -> Option<StatusNotice> {
    match (previous, next) {
        (SubscriptionStatus::Active, SubscriptionStatus::Inactive) => Some(StatusNotice::Suspended),
        (SubscriptionStatus::Inactive, SubscriptionStatus::Active) => Some(StatusNotice::Reactivated),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    #[default]
    Immediate,
    EndOfPeriod,
}

impl CancellationPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "immediate" => Some(CancellationPolicy::Immediate),
            "end_of_period" => Some(CancellationPolicy::EndOfPeriod),
            _ => None,
        }
    }

    pub fn is_entitled(
        &self,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match (status, self) {
            (SubscriptionStatus::Active, _) => true,
            (SubscriptionStatus::Cancelled, CancellationPolicy::EndOfPeriod) => {
                current_period_end.is_some_and(|end| end > now)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
}

impl SubscriptionSummary {
    pub fn new(
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let days_remaining = current_period_end
            .map(|end| end.signed_duration_since(now).num_days().max(0));

        Self {
            status,
            current_period_end,
            days_remaining,
        }
    }
}

pub fn days_since(instant: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    instant.map(|at| now.signed_duration_since(at).num_days().max(0))
}
