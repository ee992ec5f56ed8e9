//! Connection options

use signalk_shared::protocol;
use signalk_shared::state_machine::ReconnectPolicy;
use std::time::Duration;

/// Username/password pair used for the login exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Which deltas the server starts streaming on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscribeMode {
    /// Nothing until the client subscribes
    #[default]
    None,
    /// Deltas for the vessel this connection represents
    SelfOnly,
    /// All deltas
    All,
}

impl SubscribeMode {
    /// Value of the `subscribe` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscribeMode::None => "none",
            SubscribeMode::SelfOnly => "self",
            SubscribeMode::All => "all",
        }
    }
}

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Server host name or address
    pub host: String,
    pub port: u16,
    /// Use `wss`/`https`
    pub use_tls: bool,
    /// Protocol version path segment
    pub version: String,
    /// Login credentials (sent as empty strings when absent)
    pub credentials: Option<Credentials>,
    /// Log in before opening the stream
    pub use_authentication: bool,
    /// Reconnect after the stream closes
    pub reconnect: bool,
    /// Stop reconnecting after this many failures (`None` = never)
    pub max_retries: Option<u32>,
    /// Token type used when the login response names none
    pub bearer_token_type: String,
    /// Initial stream subscription
    pub subscribe: SubscribeMode,
    /// Reconnection delay (initial); zero reconnects immediately
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3000,
            use_tls: false,
            version: protocol::DEFAULT_VERSION.into(),
            credentials: None,
            use_authentication: false,
            reconnect: true,
            max_retries: None,
            bearer_token_type: protocol::DEFAULT_TOKEN_TYPE.into(),
            subscribe: SubscribeMode::None,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl ConnectionOptions {
    /// Reconnect policy for the state machine
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            reconnect: self.reconnect,
            max_retries: self.max_retries,
            use_authentication: self.use_authentication,
        }
    }

    /// Wait before the next attempt after `retries` counted failures
    ///
    /// Doubles with every failure, capped at `max_reconnect_delay`.
    pub fn backoff_delay(&self, retries: u32) -> Duration {
        if self.reconnect_delay.is_zero() || retries == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << retries.saturating_sub(1).min(16);
        std::cmp::min(
            self.reconnect_delay.saturating_mul(factor),
            self.max_reconnect_delay,
        )
    }
}
