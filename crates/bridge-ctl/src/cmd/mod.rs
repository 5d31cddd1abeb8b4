//! CLI command modules.

pub mod auth;
pub mod client;
pub mod invoke;
pub mod queue;
