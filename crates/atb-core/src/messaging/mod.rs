//! Outbound messaging abstractions; Telegram implements them in the adapter crate.

pub mod broadcast;
pub mod port;
pub mod throttled;
pub mod types;
