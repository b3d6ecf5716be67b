use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use crates::domain::{
    repositories::customers::CustomerRepository,
    value_objects::{
        enums::caching_strategies::CachingDirective, machine_identity::MachineHasher,
        subscriptions::SubscriptionSummary,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    axum_http::error_responses::LicenseFailure,
    usecases::{
        license_gate::{LicenseGate, ValidationError},
        license_mailer::LicenseMailer,
        validation::{ValidationRequest, ValidationUseCase},
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBody {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub machine_fingerprint: String,
    pub device_info: Option<Value>,
    #[serde(default)]
    pub skip_machine_update: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSuccessResponse {
    pub valid: bool,
    pub customer_name: Option<String>,
    pub subscription_info: SubscriptionSummary,
    pub machine_changed: bool,
    pub caching: CachingDirective,
}

#[derive(Debug, Serialize)]
pub struct ValidationFailureResponse {
    pub valid: bool,
    #[serde(flatten)]
    pub failure: LicenseFailure,
}

pub fn routes<C, M>(
    gate: Arc<LicenseGate<C>>,
    hasher: MachineHasher,
    mailer: Arc<M>,
    request_timeout: Duration,
) -> Router
where
    C: CustomerRepository + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    let usecase = ValidationUseCase::new(gate, hasher, mailer, request_timeout);

    Router::new()
        .route("/validate", post(validate::<C, M>))
        .with_state(Arc::new(usecase))
}

pub async fn validate<C, M>(
    State(usecase): State<Arc<ValidationUseCase<C, M>>>,
    body: Result<Json<ValidateBody>, JsonRejection>,
) -> impl IntoResponse
where
    C: CustomerRepository + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(rejection = %rejection, "validation: unreadable request body");
            return failure(&ValidationError::MissingRequiredFields);
        }
    };

    let request = ValidationRequest {
        email: body.email,
        unlock_credential: body.token,
        machine_fingerprint: body.machine_fingerprint,
        device_info: body.device_info,
        skip_machine_update: body.skip_machine_update,
    };

    match usecase.validate(request).await {
        Ok(success) => (
            StatusCode::OK,
            Json(ValidationSuccessResponse {
                valid: true,
                customer_name: success.customer_name,
                subscription_info: success.subscription,
                machine_changed: success.machine_changed,
                caching: success.caching,
            }),
        )
            .into_response(),
        Err(err) => failure(&err),
    }
}

fn failure(err: &ValidationError) -> axum::response::Response {
    (
        err.status_code(),
        Json(ValidationFailureResponse {
            valid: false,
            failure: LicenseFailure::from(err),
        }),
    )
        .into_response()
}
