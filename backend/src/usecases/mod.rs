pub mod billing;
pub mod billing_gateway;
pub mod event_ingestion;
pub mod license_gate;
pub mod license_mailer;
pub mod session_arbiter;
pub mod subscription_state;
pub mod validation;
