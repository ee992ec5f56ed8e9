//! Signals emitted by the connection manager

use crate::error::ClientError;
use serde_json::Value;
use signalk_shared::ConnectionInfo;

/// Events emitted by the connection manager
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Stream opened
    Connect,
    /// Stream closed
    Disconnect,
    /// Stream failure or login failure
    Error(ClientError),
    /// Inbound frame, parsed when it was JSON
    Message(Value),
    /// Server reported the identifier of this connection's entity
    SelfId(String),
    /// Server hello received
    ConnectionInfo(ConnectionInfo),
    /// A credential is held; API calls are authorized from now on
    FetchReady,
    /// Retry limit reached; no further reconnects
    HitMaxRetries,
}

impl ConnectionEvent {
    /// Signal name, for logs
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Connect => "connect",
            ConnectionEvent::Disconnect => "disconnect",
            ConnectionEvent::Error(_) => "error",
            ConnectionEvent::Message(_) => "message",
            ConnectionEvent::SelfId(_) => "self",
            ConnectionEvent::ConnectionInfo(_) => "connectionInfo",
            ConnectionEvent::FetchReady => "fetchReady",
            ConnectionEvent::HitMaxRetries => "hitMaxRetries",
        }
    }
}
