use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use crates::{
    domain::repositories::{
        customers::CustomerRepository, webhook_events::WebhookEventRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{customers::CustomerPostgres, webhook_events::WebhookEventPostgres},
    },
    resilience::retry::RetryPolicy,
};
use serde::Serialize;
use tracing::error;

use crate::usecases::{
    billing_gateway::BillingGateway,
    event_ingestion::{EventIngestionUseCase, IngestionError, IngestionOutcome},
    license_mailer::LicenseMailer,
    subscription_state::SubscriptionStateUseCase,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct ReceivedResponse {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub idempotent: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookErrorResponse {
    pub received: bool,
    pub error: String,
}

pub fn routes<B, M>(
    db_pool: Arc<PgPoolSquad>,
    gateway: Arc<B>,
    mailer: Arc<M>,
    webhook_secret: String,
    retry_policy: RetryPolicy,
) -> Router
where
    B: BillingGateway + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    let customer_repository = CustomerPostgres::new(Arc::clone(&db_pool));
    let event_repository = WebhookEventPostgres::new(Arc::clone(&db_pool));

    let subscription_state =
        SubscriptionStateUseCase::new(Arc::new(customer_repository), gateway, mailer);
    let usecase = EventIngestionUseCase::new(
        Arc::new(event_repository),
        subscription_state,
        webhook_secret,
        retry_policy,
    );

    Router::new()
        .route(
            "/webhook",
            post(receive::<WebhookEventPostgres, CustomerPostgres, B, M>),
        )
        .with_state(Arc::new(usecase))
}

pub async fn receive<W, C, B, M>(
    State(usecase): State<Arc<EventIngestionUseCase<W, C, B, M>>>,
    headers: HeaderMap,
    payload: Bytes,
) -> impl IntoResponse
where
    W: WebhookEventRepository + Send + Sync + 'static,
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + Send + Sync + 'static,
    M: LicenseMailer + Send + Sync + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match usecase.handle_webhook(&payload, signature).await {
        Ok(outcome) => {
            let body = ReceivedResponse {
                received: true,
                idempotent: outcome == IngestionOutcome::Idempotent,
                duplicate: outcome == IngestionOutcome::DuplicateInProgress,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            let status = err.status_code();
            let message = match &err {
                IngestionError::Processing(_) | IngestionError::Internal(_) => {
                    error!(error = %err, "ingestion: webhook delivery failed");
                    "Webhook processing failed".to_string()
                }
                _ => err.to_string(),
            };
            (
                status,
                Json(WebhookErrorResponse {
                    received: false,
                    error: message,
                }),
            )
                .into_response()
        }
    }
}
