use std::str::FromStr;

use anyhow::{Context, Result, bail};
use crates::domain::value_objects::subscriptions::CancellationPolicy;
use crates::notifications::email_client::DEFAULT_EMAIL_API_BASE;

use super::config_model::{
    BackendServer, Breaker, Database, DotEnvyConfig, Email, License, Stripe, WebhookRetry,
};
use super::stage::Stage;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    load_from(|key| std::env::var(key).ok())
}

pub(crate) fn load_from<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    let stage = match env.optional("STAGE") {
        Some(raw) => Stage::try_from(raw.as_str()).context("STAGE is invalid")?,
        None => Stage::default(),
    };

    let backend_server = BackendServer {
        port: env.parsed("SERVER_PORT_BACKEND")?,
        body_limit: env.parsed("SERVER_BODY_LIMIT")?,
        timeout: env.parsed("SERVER_TIMEOUT")?,
    };

    let database = Database {
        url: env.required("DATABASE_URL")?,
        max_connections: env.parsed_or("DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let stripe = Stripe {
        secret_key: env.required("STRIPE_SECRET_KEY")?,
        webhook_secret: env.required("STRIPE_WEBHOOK_SECRET")?,
        price_id: env.required("STRIPE_PRICE_ID")?,
        success_url: env.required("STRIPE_SUCCESS_URL")?,
        cancel_url: env.required("STRIPE_CANCEL_URL")?,
        portal_return_url: env.required("STRIPE_PORTAL_RETURN_URL")?,
    };

    let email = match env.optional("EMAIL_API_KEY") {
        Some(api_key) => Some(Email {
            api_key,
            from: env.required("EMAIL_FROM")?,
            api_base_url: env
                .optional("EMAIL_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_EMAIL_API_BASE.to_string()),
        }),
        None if stage == Stage::Production => {
            bail!("EMAIL_API_KEY is required in production")
        }
        None => None,
    };

    let cancellation_policy = match env.optional("LICENSE_CANCELLATION_POLICY") {
        Some(raw) => CancellationPolicy::parse(&raw)
            .with_context(|| format!("LICENSE_CANCELLATION_POLICY `{raw}` is invalid"))?,
        None => CancellationPolicy::default(),
    };

    let license = License {
        machine_hash_secret: env.required("MACHINE_HASH_SECRET")?,
        support_email: env.required("SUPPORT_EMAIL")?,
        request_timeout_ms: env.parsed_or("LICENSE_REQUEST_TIMEOUT_MS", 2000)?,
        cancellation_policy,
    };

    let breaker = Breaker {
        failure_threshold: env.parsed_or("BREAKER_FAILURE_THRESHOLD", 5)?,
        window_secs: env.parsed_or("BREAKER_WINDOW_SECS", 30)?,
        cooldown_secs: env.parsed_or("BREAKER_COOLDOWN_SECS", 15)?,
    };

    let webhook_retry = WebhookRetry {
        attempts: env.parsed_or("WEBHOOK_RETRY_ATTEMPTS", 3)?,
        base_ms: env.parsed_or("WEBHOOK_RETRY_BASE_MS", 100)?,
        max_ms: env.parsed_or("WEBHOOK_RETRY_MAX_MS", 2000)?,
    };

    Ok(DotEnvyConfig {
        stage,
        backend_server,
        database,
        stripe,
        email,
        license,
        breaker,
        webhook_retry,
    })
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key).with_context(|| format!("{key} is invalid"))
    }

    fn parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.required(key)?
            .parse()
            .with_context(|| format!("{key} is invalid"))
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().with_context(|| format!("{key} is invalid")),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<String, String> {
        [
            ("SERVER_PORT_BACKEND", "8080"),
            ("SERVER_BODY_LIMIT", "2"),
            ("SERVER_TIMEOUT", "30"),
            ("DATABASE_URL", "postgres://localhost/pos"),
            ("STRIPE_SECRET_KEY", "sk_test"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_test"),
            ("STRIPE_PRICE_ID", "price_1"),
            ("STRIPE_SUCCESS_URL", "https://pos.test/success"),
            ("STRIPE_CANCEL_URL", "https://pos.test/cancel"),
            ("STRIPE_PORTAL_RETURN_URL", "https://pos.test/account"),
            ("MACHINE_HASH_SECRET", "machine-secret"),
            ("SUPPORT_EMAIL", "support@pos.test"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn load_with(vars: &HashMap<String, String>) -> Result<DotEnvyConfig> {
        load_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn applies_defaults() {
        let config = load_with(&base_vars()).unwrap();

        assert_eq!(config.stage, Stage::Local);
        assert_eq!(config.backend_server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert!(config.email.is_none());
        assert_eq!(config.license.request_timeout_ms, 2000);
        assert_eq!(config.license.cancellation_policy, CancellationPolicy::Immediate);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.window_secs, 30);
        assert_eq!(config.breaker.cooldown_secs, 15);
        assert_eq!(config.webhook_retry.attempts, 3);
    }

    #[test]
    fn missing_required_value_names_the_key() {
        let mut vars = base_vars();
        vars.remove("STRIPE_WEBHOOK_SECRET");

        let err = load_with(&vars).unwrap_err();
        assert!(err.to_string().contains("STRIPE_WEBHOOK_SECRET"));
    }

    #[test]
    fn production_requires_email_provider() {
        let mut vars = base_vars();
        vars.insert("STAGE".to_string(), "production".to_string());

        let err = load_with(&vars).unwrap_err();
        assert!(err.to_string().contains("EMAIL_API_KEY"));

        vars.insert("EMAIL_API_KEY".to_string(), "re_key".to_string());
        vars.insert("EMAIL_FROM".to_string(), "license@pos.test".to_string());
        let config = load_with(&vars).unwrap();
        let email = config.email.unwrap();
        assert_eq!(email.api_base_url, DEFAULT_EMAIL_API_BASE);
    }

    #[test]
    fn parses_cancellation_policy() {
        let mut vars = base_vars();
        vars.insert(
            "LICENSE_CANCELLATION_POLICY".to_string(),
            "end_of_period".to_string(),
        );

        let config = load_with(&vars).unwrap();
        assert_eq!(config.license.cancellation_policy, CancellationPolicy::EndOfPeriod);
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let mut vars = base_vars();
        vars.insert("BREAKER_COOLDOWN_SECS".to_string(), "soon".to_string());

        let err = load_with(&vars).unwrap_err();
        assert!(err.to_string().contains("BREAKER_COOLDOWN_SECS"));
    }
}
