//! JSON frame codec for the Signal K stream
//!
//! Inbound frames are text. A frame that parses to an object carrying
//! `name`, `version` and `roles` is the server's hello:
//! ```text
//! {"name":"signalk-server","version":"2.0.0","roles":["master","main"],"self":"vessels.urn:mrn:imo:mmsi:1234"}
//! ```
//! Every other frame is passed on as generic JSON.
//!
//! Outbound frames are serialized to text, optionally carrying a `token` field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::TOKEN_FIELD;

/// Keys whose joint presence marks a handshake frame
const HANDSHAKE_KEYS: [&str; 3] = ["name", "version", "roles"];

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid JSON frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Malformed handshake frame: {0}")]
    MalformedHandshake(String),
}

/// Server self-identification sent at the start of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub version: String,
    pub roles: Vec<String>,
    /// Identifier of the entity this connection represents
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Any additional fields the server sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectionInfo {
    /// The `self` identifier, if the server sent a non-empty one
    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Server hello
    Handshake {
        info: ConnectionInfo,
        payload: Value,
    },
    /// Anything else
    Generic(Value),
}

impl InboundFrame {
    pub fn payload(&self) -> &Value {
        match self {
            InboundFrame::Handshake { payload, .. } => payload,
            InboundFrame::Generic(payload) => payload,
        }
    }
}

/// A frame to be written to the stream
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Pre-serialized text
    Text(String),
    /// Structured payload
    Json(Value),
}

impl From<Value> for OutboundFrame {
    fn from(value: Value) -> Self {
        OutboundFrame::Json(value)
    }
}

impl From<String> for OutboundFrame {
    fn from(text: String) -> Self {
        OutboundFrame::Text(text)
    }
}

impl From<&str> for OutboundFrame {
    fn from(text: &str) -> Self {
        OutboundFrame::Text(text.to_string())
    }
}

/// Check whether a value has the shape of a handshake frame
pub fn is_handshake(value: &Value) -> bool {
    match value {
        Value::Object(map) => HANDSHAKE_KEYS.iter().all(|key| map.contains_key(*key)),
        _ => false,
    }
}

/// Decode an inbound text frame
///
/// Returns `Err` if the text is not JSON, or if it has the handshake shape
/// but its fields have the wrong types.
pub fn decode(text: &str) -> Result<InboundFrame, CodecError> {
    let payload: Value = serde_json::from_str(text)?;

    if !is_handshake(&payload) {
        return Ok(InboundFrame::Generic(payload));
    }

    let info = ConnectionInfo::deserialize(&payload)
        .map_err(|e| CodecError::MalformedHandshake(e.to_string()))?;

    Ok(InboundFrame::Handshake { info, payload })
}

/// Encode an outbound frame, injecting `token` into structured objects
///
/// Text that parses as JSON is treated as structured. Text that does not is
/// returned unmodified.
pub fn encode(frame: OutboundFrame, token: Option<&str>) -> Result<String, CodecError> {
    let mut value = match frame {
        OutboundFrame::Json(value) => value,
        OutboundFrame::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(_) => return Ok(text),
        },
    };

    if let (Some(token), Value::Object(map)) = (token, &mut value) {
        map.insert(TOKEN_FIELD.to_string(), Value::String(token.to_string()));
    }

    Ok(serde_json::to_string(&value)?)
}
