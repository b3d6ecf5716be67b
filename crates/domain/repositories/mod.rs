pub mod active_sessions;
pub mod customers;
pub mod webhook_events;
