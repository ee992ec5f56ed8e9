//! Error taxonomy for the connection manager

use signalk_shared::codec::CodecError;
use thiserror::Error;

/// Errors returned by operations or carried by the `Error` signal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Login response was malformed or missing its token
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not connected to the stream")]
    NotConnected,

    /// Request transport answered with a non-2xx status
    #[error("HTTP error: {status} {status_text}")]
    Http { status: u16, status_text: String },

    #[error("Transport error: {0}")]
    Transport(String),

    /// Retry limit reached; the manager will not reconnect again
    #[error("Maximum retries ({0}) reached")]
    RetryExhausted(u32),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The connection actor has stopped
    #[error("Connection manager closed")]
    Closed,
}

impl ClientError {
    /// Wrap a transport adapter failure
    pub fn transport(err: anyhow::Error) -> Self {
        ClientError::Transport(format!("{:#}", err))
    }
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
