pub mod billing;
pub mod sessions;
pub mod validation;
pub mod webhook;
