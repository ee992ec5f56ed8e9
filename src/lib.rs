//! Signal K client connection manager
//!
//! Connects to a Signal K server over a WebSocket delta stream and its HTTP
//! API, logs in when asked to, and keeps the stream alive with bounded
//! reconnection.

pub mod auth;
pub mod connection;
pub mod error;
pub mod request;
pub mod transport;
pub mod uri;

pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionOptions, ConnectionStatus, Credentials,
    SubscribeMode,
};
pub use error::ClientError;
pub use request::{FetchBody, FetchOptions};
pub use signalk_shared::{ConnectionInfo, Credential, OutboundFrame};
