use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::post,
};
use crates::domain::repositories::customers::CustomerRepository;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    axum_http::error_responses::AppError,
    usecases::{
        billing::BillingUseCase, billing_gateway::BillingGateway, license_gate::LicenseGate,
    },
};

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PortalBody {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub url: String,
}

pub fn routes<C, B>(gate: Arc<LicenseGate<C>>, gateway: Arc<B>) -> Router
where
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + 'static,
{
    let usecase = BillingUseCase::new(gate, gateway);

    Router::new()
        .route("/checkout", post(checkout::<C, B>))
        .route("/portal", post(portal::<C, B>))
        .with_state(Arc::new(usecase))
}

pub async fn checkout<C, B>(
    State(usecase): State<Arc<BillingUseCase<C, B>>>,
    Json(body): Json<CheckoutBody>,
) -> Result<impl IntoResponse, AppError>
where
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + 'static,
{
    info!("billing: checkout request received");
    let url = usecase.checkout(&body.email).await?;
    Ok(Json(RedirectResponse { url }))
}

pub async fn portal<C, B>(
    State(usecase): State<Arc<BillingUseCase<C, B>>>,
    Json(body): Json<PortalBody>,
) -> Result<impl IntoResponse, AppError>
where
    C: CustomerRepository + Send + Sync + 'static,
    B: BillingGateway + 'static,
{
    let url = usecase.portal(&body.email, &body.token).await?;
    Ok(Json(RedirectResponse { url }))
}
