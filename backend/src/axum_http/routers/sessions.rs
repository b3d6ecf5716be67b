use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use crates::{
    domain::{
        repositories::{active_sessions::ActiveSessionRepository, customers::CustomerRepository},
        value_objects::{
            machine_identity::MachineHasher,
            sessions::{HeartbeatOutcome, SessionConflict, SessionStartOutcome},
        },
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::active_sessions::ActiveSessionPostgres,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    axum_http::error_responses::LicenseFailure,
    usecases::{
        license_gate::{LicenseGate, ValidationError},
        session_arbiter::{SessionArbiterUseCase, SessionClaim, SessionError},
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaimBody {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub machine_fingerprint: String,
    #[serde(default)]
    pub session_id: String,
    pub device_info: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdBody {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantedResponse {
    pub granted: bool,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConflictResponse {
    pub granted: bool,
    pub error: &'static str,
    pub conflict: SessionConflict,
}

#[derive(Debug, Serialize)]
pub struct SessionFailureResponse {
    pub granted: bool,
    #[serde(flatten)]
    pub failure: LicenseFailure,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct OkFailureResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub failure: LicenseFailure,
}

pub fn routes<C>(
    db_pool: Arc<PgPoolSquad>,
    gate: Arc<LicenseGate<C>>,
    hasher: MachineHasher,
    request_timeout: Duration,
) -> Router
where
    C: CustomerRepository + Send + Sync + 'static,
{
    let session_repository = ActiveSessionPostgres::new(Arc::clone(&db_pool));
    let usecase = SessionArbiterUseCase::new(
        gate,
        Arc::new(session_repository),
        hasher,
        request_timeout,
    );

    Router::new()
        .route("/start", post(start::<C, ActiveSessionPostgres>))
        .route("/takeover", post(takeover::<C, ActiveSessionPostgres>))
        .route("/heartbeat", post(heartbeat::<C, ActiveSessionPostgres>))
        .route("/end", post(end::<C, ActiveSessionPostgres>))
        .with_state(Arc::new(usecase))
}

pub async fn start<C, S>(
    State(usecase): State<Arc<SessionArbiterUseCase<C, S>>>,
    body: Result<Json<SessionClaimBody>, JsonRejection>,
) -> impl IntoResponse
where
    C: CustomerRepository + Send + Sync + 'static,
    S: ActiveSessionRepository + Send + Sync + 'static,
{
    let claim = match read_claim(body) {
        Ok(claim) => claim,
        Err(err) => return claim_failure(&err),
    };
    let session_id = claim.session_id.trim().to_string();

    match usecase.start(claim).await {
        Ok(SessionStartOutcome::Granted) => granted(session_id),
        Ok(SessionStartOutcome::Conflict(conflict)) => (
            StatusCode::CONFLICT,
            Json(ConflictResponse {
                granted: false,
                error: "session_conflict",
                conflict,
            }),
        )
            .into_response(),
        Ok(SessionStartOutcome::SessionIdTaken) => claim_failure(&SessionError::SessionIdTaken),
        Err(err) => claim_failure(&err),
    }
}

pub async fn takeover<C, S>(
    State(usecase): State<Arc<SessionArbiterUseCase<C, S>>>,
    body: Result<Json<SessionClaimBody>, JsonRejection>,
) -> impl IntoResponse
where
    C: CustomerRepository + Send + Sync + 'static,
    S: ActiveSessionRepository + Send + Sync + 'static,
{
    let claim = match read_claim(body) {
        Ok(claim) => claim,
        Err(err) => return claim_failure(&err),
    };

    match usecase.takeover(claim).await {
        Ok(session_id) => granted(session_id),
        Err(err) => claim_failure(&err),
    }
}

pub async fn heartbeat<C, S>(
    State(usecase): State<Arc<SessionArbiterUseCase<C, S>>>,
    body: Result<Json<SessionIdBody>, JsonRejection>,
) -> impl IntoResponse
where
    C: CustomerRepository + Send + Sync + 'static,
    S: ActiveSessionRepository + Send + Sync + 'static,
{
    let session_id = body.map(|Json(body)| body.session_id).unwrap_or_default();

    match usecase.heartbeat(&session_id).await {
        Ok(HeartbeatOutcome::Ok) => ok(StatusCode::OK, None),
        Ok(HeartbeatOutcome::NotFound) => ok(StatusCode::NOT_FOUND, Some("session_not_found")),
        Ok(HeartbeatOutcome::Kicked) => ok(StatusCode::NOT_FOUND, Some("session_kicked")),
        Err(err) => ok_failure(&err),
    }
}

pub async fn end<C, S>(
    State(usecase): State<Arc<SessionArbiterUseCase<C, S>>>,
    body: Result<Json<SessionIdBody>, JsonRejection>,
) -> impl IntoResponse
where
    C: CustomerRepository + Send + Sync + 'static,
    S: ActiveSessionRepository + Send + Sync + 'static,
{
    let session_id = body.map(|Json(body)| body.session_id).unwrap_or_default();

    match usecase.end(&session_id).await {
        Ok(()) => ok(StatusCode::OK, None),
        Err(err) => ok_failure(&err),
    }
}

fn read_claim(body: Result<Json<SessionClaimBody>, JsonRejection>) -> Result<SessionClaim, SessionError> {
    let Json(body) = body.map_err(|rejection| {
        warn!(rejection = %rejection, "sessions: unreadable request body");
        SessionError::Validation(ValidationError::MissingRequiredFields)
    })?;

    Ok(SessionClaim {
        email: body.email,
        unlock_credential: body.token,
        machine_fingerprint: body.machine_fingerprint,
        session_id: body.session_id,
        device_info: body.device_info,
    })
}

fn granted(session_id: String) -> Response {
    (
        StatusCode::OK,
        Json(GrantedResponse {
            granted: true,
            session_id,
        }),
    )
        .into_response()
}

fn claim_failure(err: &SessionError) -> Response {
    (
        err.status_code(),
        Json(SessionFailureResponse {
            granted: false,
            failure: LicenseFailure::from(err),
        }),
    )
        .into_response()
}

fn ok(status: StatusCode, error: Option<&'static str>) -> Response {
    (
        status,
        Json(OkResponse {
            ok: error.is_none(),
            error,
        }),
    )
        .into_response()
}

fn ok_failure(err: &SessionError) -> Response {
    (
        err.status_code(),
        Json(OkFailureResponse {
            ok: false,
            failure: LicenseFailure::from(err),
        }),
    )
        .into_response()
}
