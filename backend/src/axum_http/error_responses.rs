use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crates::domain::value_objects::enums::{
    caching_strategies::CachingDirective, subscription_statuses::SubscriptionStatus,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::usecases::{
    billing::BillingError,
    license_gate::ValidationError,
    session_arbiter::SessionError,
};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

/// Device-facing failure body. Callers wrap it with their own
/// `valid`/`granted`/`ok` flag.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseFailure {
    pub error: &'static str,
    pub error_code: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_since_last_seen: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caching: Option<CachingDirective>,
}

impl From<&ValidationError> for LicenseFailure {
    fn from(err: &ValidationError) -> Self {
        let (status, days_since_last_seen, support_email) = match err {
            ValidationError::SubscriptionInactive {
                status,
                days_since_last_seen,
                support_email,
            } => (Some(*status), *days_since_last_seen, Some(support_email.clone())),
            _ => (None, None, None),
        };

        Self {
            error: err.title(),
            error_code: err.error_code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
            status,
            days_since_last_seen,
            support_email,
            caching: err.caching(),
        }
    }
}

impl From<&SessionError> for LicenseFailure {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::Validation(inner) => LicenseFailure::from(inner),
            SessionError::MissingSessionId => Self {
                error: "Missing session id",
                error_code: "missing_session_id",
                message: err.to_string(),
                retryable: false,
                status: None,
                days_since_last_seen: None,
                support_email: None,
                caching: None,
            },
            SessionError::SessionIdTaken => Self {
                error: "Session id in use",
                error_code: "session_id_taken",
                message: err.to_string(),
                retryable: false,
                status: None,
                days_since_last_seen: None,
                support_email: None,
                caching: None,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    License(#[from] ValidationError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InvalidEmail => AppError::BadRequest(err.to_string()),
            BillingError::Access(inner) => AppError::License(inner),
            BillingError::Internal(inner) => AppError::Internal(inner),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(message) => {
                let status = StatusCode::BAD_REQUEST;
                let body = Json(ErrorResponse {
                    code: status.as_u16(),
                    message,
                });
                (status, body).into_response()
            }
            AppError::License(err) => {
                (err.status_code(), Json(LicenseFailure::from(&err))).into_response()
            }
            AppError::Internal(err) => {
                error!(error = ?err, "http: internal error");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                // Internal detail stays in the logs.
                let body = Json(ErrorResponse {
                    code: status.as_u16(),
                    message: "Internal server error".to_string(),
                });
                (status, body).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inactive_failure_carries_context_and_minimal_caching() {
        let err = ValidationError::SubscriptionInactive {
            status: SubscriptionStatus::Inactive,
            days_since_last_seen: Some(4),
            support_email: "support@pos.test".to_string(),
        };

        let body = serde_json::to_value(LicenseFailure::from(&err)).unwrap();

        assert_eq!(body["error"], "Subscription inactive");
        assert_eq!(body["errorCode"], "subscription_inactive");
        assert_eq!(body["status"], "inactive");
        assert_eq!(body["daysSinceLastSeen"], 4);
        assert_eq!(body["supportEmail"], "support@pos.test");
        assert_eq!(body["caching"], json!({ "strategy": "minimal", "durationSeconds": 300 }));
        assert_eq!(body["retryable"], false);
    }

    #[test]
    fn degraded_failure_is_retryable_without_context() {
        let body = serde_json::to_value(LicenseFailure::from(&ValidationError::SystemDegraded)).unwrap();

        assert_eq!(body["errorCode"], "system_degraded");
        assert_eq!(body["retryable"], true);
        assert!(body.get("status").is_none());
        assert!(body.get("caching").is_none());
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak() {
        let response = AppError::Internal(anyhow::anyhow!("password=hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "code": 500, "message": "Internal server error" }));
    }
}
