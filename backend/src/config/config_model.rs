use crates::domain::value_objects::subscriptions::CancellationPolicy;

use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub backend_server: BackendServer,
    pub database: Database,
    pub stripe: Stripe,
    pub email: Option<Email>,
    pub license: License,
    pub breaker: Breaker,
    pub webhook_retry: WebhookRetry,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    /// MiB
    pub body_limit: u64,
    /// Seconds
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Stripe {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub portal_return_url: String,
}

#[derive(Debug, Clone)]
pub struct Email {
    pub api_key: String,
    pub from: String,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct License {
    pub machine_hash_secret: String,
    pub support_email: String,
    pub request_timeout_ms: u64,
    pub cancellation_policy: CancellationPolicy,
}

#[derive(Debug, Clone)]
pub struct Breaker {
    pub failure_threshold: u32,
    pub window_secs: u64,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WebhookRetry {
    pub attempts: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}
