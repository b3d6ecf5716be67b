pub mod caching_strategies;
pub mod session_statuses;
pub mod subscription_statuses;
pub mod webhook_processing_statuses;
