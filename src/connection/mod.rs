//! Connection management for a Signal K server
//!
//! This module handles:
//! - Login before the stream opens, and credential injection afterwards
//! - The WebSocket delta stream with automatic reconnection and backoff
//! - Retry accounting and the terminal retry limit
//! - Authorized calls to the HTTP API

mod config;
mod events;
mod manager;

pub use config::{ConnectionOptions, Credentials, SubscribeMode};
pub use events::ConnectionEvent;
pub use manager::{ConnectionManager, ConnectionStatus};
