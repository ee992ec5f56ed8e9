//! Signal K Shared Protocol Types
//!
//! This crate provides the protocol constants, frame codec and connection
//! state machine shared by Signal K client components. Nothing in here
//! performs I/O.

pub mod codec;
pub mod state_machine;

use std::time::{SystemTime, UNIX_EPOCH};

pub use codec::{ConnectionInfo, InboundFrame, OutboundFrame};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Fixed protocol parameters
pub mod protocol {
    /// Path namespace every Signal K endpoint lives under
    pub const NAMESPACE: &str = "signalk";

    /// Default protocol version segment
    pub const DEFAULT_VERSION: &str = "v1";

    /// Port that is left out of composed addresses
    pub const DEFAULT_PORT: u16 = 80;

    /// Login endpoint, relative to the API root
    pub const LOGIN_PATH: &str = "/auth/login";

    /// Token type used when the login response does not name one
    pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

    /// Field injected into outbound structured frames when authenticated
    pub const TOKEN_FIELD: &str = "token";

    /// Endpoints served next to the API root rather than under it
    pub const AUXILIARY_ENDPOINTS: [&str; 3] = ["auth/login", "access/requests", "security"];
}

/// Authorization obtained from a login or injected by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Token type, e.g. `Bearer` or `JWT`
    pub kind: String,
    pub token: String,
}

impl Credential {
    pub fn new(kind: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            token: token.into(),
        }
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> String {
        format!("{} {}", self.kind, self.token)
    }
}
