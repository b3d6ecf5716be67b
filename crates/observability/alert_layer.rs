use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use super::config::ServiceContext;

const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub(crate) struct Alert {
    pub(crate) level: Level,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) service: ServiceContext,
    pub(crate) target: String,
    pub(crate) location: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) fields: BTreeMap<String, String>,
}

#[async_trait]
pub(crate) trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<()>;
    fn sink_name(&self) -> &'static str;
}

/// Bounded hand-off from the tracing hot path to a background delivery task.
#[derive(Clone)]
pub(crate) struct AlertQueue {
    tx: mpsc::Sender<Alert>,
}

impl AlertQueue {
    /// Must be called inside a tokio runtime.
    pub(crate) fn spawn(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Alert>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                for sink in &sinks {
                    if let Err(err) = sink.deliver(&alert).await {
                        // Target excluded from the alert layer to avoid feedback loops.
                        warn!(target: "alert_delivery", sink = sink.sink_name(), error = %err, "observability: alert delivery failed");
                    }
                }
            }
        });

        Self { tx }
    }

    fn push(&self, alert: Alert) {
        if self.tx.try_send(alert).is_err() {
            warn!(target: "alert_delivery", "observability: alert queue full or closed, dropping alert");
        }
    }
}

pub(crate) struct AlertLayer {
    queue: AlertQueue,
    service: ServiceContext,
    min_level: Level,
}

impl AlertLayer {
    pub(crate) fn new(queue: AlertQueue, service: ServiceContext, min_level: Level) -> Self {
        Self {
            queue,
            service,
            min_level,
        }
    }
}

#[derive(Default)]
struct RedactingVisitor {
    values: BTreeMap<String, String>,
}

impl RedactingVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        let value = if is_sensitive_key(field.name()) {
            "[REDACTED]".to_string()
        } else {
            value
        };
        self.values.insert(field.name().to_string(), value);
    }
}

impl Visit for RedactingVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }
}

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.min_level || metadata.target() == "alert_delivery" {
            return;
        }

        let mut visitor = RedactingVisitor::default();
        event.record(&mut visitor);
        let message = visitor
            .values
            .remove("message")
            .map(|raw| raw.trim_matches('"').to_string());

        self.queue.push(Alert {
            level: *metadata.level(),
            timestamp: Utc::now(),
            service: self.service.clone(),
            target: metadata.target().to_string(),
            location: metadata
                .file()
                .zip(metadata.line())
                .map(|(file, line)| format!("{file}:{line}")),
            message,
            fields: visitor.values,
        });
    }
}

/// Field names that may carry credentials, customer identity or device identity.
pub(crate) fn is_sensitive_key(field_name: &str) -> bool {
    const SENSITIVE: &[&str] = &[
        "token",
        "secret",
        "credential",
        "fingerprint",
        "email",
        "password",
        "authorization",
        "webhook",
        "signature",
    ];

    let field = field_name.to_ascii_lowercase();
    SENSITIVE.iter().any(|needle| field.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_identity_and_secret_fields() {
        for key in [
            "unlock_credential",
            "machine_fingerprint",
            "customer_email",
            "stripe_signature",
            "Authorization",
        ] {
            assert!(is_sensitive_key(key), "{key} should be redacted");
        }
    }

    #[test]
    fn keeps_operational_fields() {
        for key in ["customer_id", "event_id", "status", "attempt"] {
            assert!(!is_sensitive_key(key), "{key} should be kept");
        }
    }
}
