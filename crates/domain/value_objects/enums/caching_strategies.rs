use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::subscription_statuses::SubscriptionStatus;

/// How long a device may trust its last positive answer before asking again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CachingStrategy {
    Aggressive,
    Moderate,
    Conservative,
    Minimal,
}

impl CachingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachingStrategy::Aggressive => "aggressive",
            CachingStrategy::Moderate => "moderate",
            CachingStrategy::Conservative => "conservative",
            CachingStrategy::Minimal => "minimal",
        }
    }

    pub fn duration_seconds(&self) -> u32 {
        match self {
            CachingStrategy::Aggressive => 3600,
            CachingStrategy::Moderate => 1800,
            CachingStrategy::Conservative => 900,
            CachingStrategy::Minimal => 300,
        }
    }

    /// `previous_validation` must be the value read before this request updates it.
    pub fn select(
        previous_validation: Option<DateTime<Utc>>,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        if !status.is_active() {
            return CachingStrategy::Minimal;
        }

        let Some(previous) = previous_validation else {
            return CachingStrategy::Conservative;
        };

        let elapsed = now.signed_duration_since(previous);
        if elapsed < Duration::hours(1) {
            CachingStrategy::Aggressive
        } else if elapsed <= Duration::hours(24) {
            CachingStrategy::Moderate
        } else {
            CachingStrategy::Conservative
        }
    }
}

/// Wire form of a caching decision.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachingDirective {
    pub strategy: CachingStrategy,
    pub duration_seconds: u32,
}

impl From<CachingStrategy> for CachingDirective {
    fn from(strategy: CachingStrategy) -> Self {
        Self {
            strategy,
            duration_seconds: strategy.duration_seconds(),
        }
    }
}

impl Display for CachingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn recent_validation_is_aggressive() {
        let strategy = CachingStrategy::select(
            Some(now() - Duration::minutes(59)),
            SubscriptionStatus::Active,
            now(),
        );
        assert_eq!(strategy, CachingStrategy::Aggressive);
        assert_eq!(strategy.duration_seconds(), 3600);
    }

    #[test]
    fn one_hour_boundary_is_moderate() {
        let strategy = CachingStrategy::select(
            Some(now() - Duration::hours(1)),
            SubscriptionStatus::Active,
            now(),
        );
        assert_eq!(strategy, CachingStrategy::Moderate);
    }

    #[test]
    fn two_hours_is_moderate() {
        let strategy = CachingStrategy::select(
            Some(now() - Duration::hours(2)),
            SubscriptionStatus::Active,
            now(),
        );
        assert_eq!(strategy, CachingStrategy::Moderate);
        assert_eq!(strategy.duration_seconds(), 1800);
    }

    #[test]
    fn twenty_four_hours_is_still_moderate() {
        let strategy = CachingStrategy::select(
            Some(now() - Duration::hours(24)),
            SubscriptionStatus::Active,
            now(),
        );
        assert_eq!(strategy, CachingStrategy::Moderate);
    }

    #[test]
    fn stale_or_missing_validation_is_conservative() {
        let stale = CachingStrategy::select(
            Some(now() - Duration::hours(25)),
            SubscriptionStatus::Active,
            now(),
        );
        let never = CachingStrategy::select(None, SubscriptionStatus::Active, now());
        assert_eq!(stale, CachingStrategy::Conservative);
        assert_eq!(never, CachingStrategy::Conservative);
        assert_eq!(never.duration_seconds(), 900);
    }

    #[test]
    fn non_active_is_minimal_regardless_of_recency() {
        let strategy = CachingStrategy::select(
            Some(now() - Duration::minutes(5)),
            SubscriptionStatus::Inactive,
            now(),
        );
        assert_eq!(strategy, CachingStrategy::Minimal);
        assert_eq!(strategy.duration_seconds(), 300);
    }
}
