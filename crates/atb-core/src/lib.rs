//! Core domain + application logic for the Advanced Telegram Bot.
//!
//! Framework-agnostic: Telegram and the external HTTP services live behind
//! ports (traits) implemented in adapter crates.

pub mod calc;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod moderation;
pub mod security;
pub mod sysstat;
pub mod utils;

pub use errors::{Error, Result};
