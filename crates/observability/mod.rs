mod alert_layer;
mod config;
mod discord;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use alert_layer::{AlertLayer, AlertQueue};
use config::ObservabilityConfig;
use discord::DiscordAlertSink;

/// Installs the global subscriber: RUST_LOG filter (default `info`), local-time
/// fmt output, and optional Discord alerts for high-severity events.
///
/// Must run inside the tokio runtime when Discord alerts are configured.
pub fn init_observability(component: &str) -> Result<()> {
    let config = ObservabilityConfig::from_env(component);

    let alert_layer = match config.discord.as_ref() {
        Some(sink_config) => {
            let sink = DiscordAlertSink::new(sink_config.webhook_url.clone())?;
            let queue = AlertQueue::spawn(vec![Arc::new(sink)]);
            Some(
                AlertLayer::new(queue, config.service_context.clone(), sink_config.min_level)
                    .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                        sink_config.min_level,
                    )),
            )
        }
        None => None,
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(alert_layer)
        .with(env_filter)
        .try_init()?;

    for warning in &config.warnings {
        warn!(
            component = %config.service_context.component,
            warning = %warning,
            "observability: config warning"
        );
    }

    info!(
        service = %config.service_context.service_name,
        environment = %config.service_context.environment,
        component = %config.service_context.component,
        discord_alerts = config.discord.is_some(),
        "observability: tracing initialised"
    );

    Ok(())
}
