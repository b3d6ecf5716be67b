pub mod billing_events;
pub mod enums;
pub mod machine_identity;
pub mod sessions;
pub mod subscriptions;
pub mod unlock_credentials;
pub mod webhook_events;
