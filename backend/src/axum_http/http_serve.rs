use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    usecases::{license_gate::LicenseGate, license_mailer::EmailLicenseMailer},
};
use anyhow::{Context, Result};
use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};
use crates::{
    domain::value_objects::machine_identity::MachineHasher,
    infra::db::{
        postgres::postgres_connection::PgPoolSquad, repositories::customers::CustomerPostgres,
    },
    notifications::email_client::{EmailClient, EmailSettings},
    payments::stripe_client::{StripeClient, StripeSettings},
    resilience::{
        circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
        retry::RetryPolicy,
    },
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

const OUTBOUND_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<()> {
    let stripe_client = Arc::new(StripeClient::new(
        StripeSettings {
            secret_key: config.stripe.secret_key.clone(),
            price_id: config.stripe.price_id.clone(),
            success_url: config.stripe.success_url.clone(),
            cancel_url: config.stripe.cancel_url.clone(),
            portal_return_url: config.stripe.portal_return_url.clone(),
        },
        OUTBOUND_HTTP_TIMEOUT,
    )?);

    let email_client = match config.email.as_ref() {
        Some(email) => Some(EmailClient::new(
            EmailSettings {
                api_key: email.api_key.clone(),
                from: email.from.clone(),
                api_base_url: email.api_base_url.clone(),
            },
            OUTBOUND_HTTP_TIMEOUT,
        )?),
        None => {
            info!(stage = %config.stage, "Email provider not configured, notices will only be logged");
            None
        }
    };
    let mailer = Arc::new(EmailLicenseMailer::new(
        email_client,
        config.license.support_email.clone(),
    ));

    let hasher = MachineHasher::new(&config.license.machine_hash_secret)
        .context("MACHINE_HASH_SECRET is unusable")?;

    let breaker = Arc::new(CircuitBreaker::new(
        "license-store",
        CircuitBreakerConfig {
            failure_threshold: config.breaker.failure_threshold,
            failure_window: Duration::from_secs(config.breaker.window_secs),
            cooldown: Duration::from_secs(config.breaker.cooldown_secs),
        },
    ));
    let gate = Arc::new(LicenseGate::new(
        Arc::new(CustomerPostgres::new(Arc::clone(&db_pool))),
        breaker,
        config.license.cancellation_policy,
        config.license.support_email.clone(),
    ));

    let request_timeout = Duration::from_millis(config.license.request_timeout_ms);
    let retry_policy = RetryPolicy {
        max_attempts: config.webhook_retry.attempts,
        initial_delay: Duration::from_millis(config.webhook_retry.base_ms),
        max_delay: Duration::from_millis(config.webhook_retry.max_ms),
        ..RetryPolicy::default()
    };

    let app = Router::new()
        .fallback(default_routers::not_found)
        .merge(routers::webhook::routes(
            Arc::clone(&db_pool),
            Arc::clone(&stripe_client),
            Arc::clone(&mailer),
            config.stripe.webhook_secret.clone(),
            retry_policy,
        ))
        .merge(routers::validation::routes(
            Arc::clone(&gate),
            hasher.clone(),
            Arc::clone(&mailer),
            request_timeout,
        ))
        .nest(
            "/session",
            routers::sessions::routes(
                Arc::clone(&db_pool),
                Arc::clone(&gate),
                hasher,
                request_timeout,
            ),
        )
        .nest("/billing", routers::billing::routes(gate, stripe_client))
        .route("/health", get(default_routers::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!(stage = %config.stage, "Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
