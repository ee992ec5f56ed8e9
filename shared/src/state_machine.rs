//! Connection State Machine
//!
//! Retry accounting, reconnect policy and lifecycle flags for a Signal K
//! connection. The caller performs the I/O that each decision asks for.

/// Lifecycle state of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt in progress
    Idle,
    /// Login request in flight
    Authenticating,
    /// Stream requested, waiting for it to open
    StreamConnecting,
    /// Stream open
    Connected,
    /// Stream close requested
    Closing,
    /// Stream reported an error
    Errored,
    /// Listeners released, no further automatic reconnects
    Terminated,
}

/// Reconnect policy taken from the connection options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnect after the stream closes
    pub reconnect: bool,
    /// Stop once this many failures were counted (`None` = never)
    pub max_retries: Option<u32>,
    /// Log in before opening the stream
    pub use_authentication: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            reconnect: true,
            max_retries: None,
            use_authentication: false,
        }
    }
}

/// What the caller must do after a reconnect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// An attempt is already in flight; nothing to do
    InFlight,
    /// A stream is still attached; close it and wait for its close event
    CloseStream,
    /// Retry limit reached; signal it and release listeners
    RetriesExhausted,
    /// Reconnection disabled by policy; release listeners
    ReconnectDisabled,
    /// Disconnect was requested; release listeners
    DisconnectRequested,
    /// Log in, then open the stream
    Authenticate,
    /// Open the stream
    OpenStream,
}

impl ReconnectDecision {
    /// Whether this decision ends the connection's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReconnectDecision::RetriesExhausted
                | ReconnectDecision::ReconnectDisabled
                | ReconnectDecision::DisconnectRequested
        )
    }
}

/// The connection lifecycle state machine
#[derive(Debug)]
pub struct ConnectionStateMachine {
    policy: ReconnectPolicy,
    state: ConnectionState,
    retries: u32,
    is_connecting: bool,
    connected: bool,
    should_disconnect: bool,
    stream_attached: bool,
    /// The current failure episode was already counted by an error event
    failure_counted: bool,
}

impl ConnectionStateMachine {
    /// Create a new state machine in Idle state
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Idle,
            retries: 0,
            is_connecting: false,
            connected: false,
            should_disconnect: false,
            stream_attached: false,
            failure_counted: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Failures counted over the whole lifetime of this machine
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn is_connecting(&self) -> bool {
        self.is_connecting
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn disconnect_requested(&self) -> bool {
        self.should_disconnect
    }

    /// Decide how to handle a reconnect request
    ///
    /// `initial` skips the retry limit, policy and disconnect checks.
    pub fn reconnect(&mut self, initial: bool) -> ReconnectDecision {
        if self.is_connecting {
            return ReconnectDecision::InFlight;
        }

        if self.stream_attached {
            self.state = ConnectionState::Closing;
            return ReconnectDecision::CloseStream;
        }

        if !initial {
            if self.policy.max_retries == Some(self.retries) {
                self.terminate();
                return ReconnectDecision::RetriesExhausted;
            }

            if !self.policy.reconnect {
                self.terminate();
                return ReconnectDecision::ReconnectDisabled;
            }

            if self.should_disconnect {
                self.should_disconnect = false;
                self.terminate();
                return ReconnectDecision::DisconnectRequested;
            }
        }

        self.is_connecting = true;
        self.should_disconnect = false;

        if self.policy.use_authentication {
            self.state = ConnectionState::Authenticating;
            ReconnectDecision::Authenticate
        } else {
            self.state = ConnectionState::StreamConnecting;
            ReconnectDecision::OpenStream
        }
    }

    /// Continue an in-flight attempt after a wait (backoff or login)
    ///
    /// A disconnect requested meanwhile abandons the attempt.
    pub fn proceed(&mut self, next: ReconnectDecision) -> ReconnectDecision {
        if self.should_disconnect {
            self.should_disconnect = false;
            self.terminate();
            return ReconnectDecision::DisconnectRequested;
        }

        match next {
            ReconnectDecision::Authenticate => self.state = ConnectionState::Authenticating,
            ReconnectDecision::OpenStream => self.state = ConnectionState::StreamConnecting,
            _ => {}
        }
        next
    }

    /// Login failed; the attempt ends without retrying
    pub fn login_failed(&mut self) {
        self.is_connecting = false;
        self.state = ConnectionState::Idle;
    }

    /// A stream was requested from the transport
    pub fn stream_requested(&mut self) {
        self.stream_attached = true;
        self.state = ConnectionState::StreamConnecting;
    }

    /// The stream opened
    pub fn on_open(&mut self) {
        self.connected = true;
        self.is_connecting = false;
        self.failure_counted = false;
        self.state = ConnectionState::Connected;
    }

    /// The stream reported an error. Returns whether a retry was counted.
    pub fn on_error(&mut self) -> bool {
        self.state = ConnectionState::Errored;
        if self.failure_counted {
            return false;
        }
        self.failure_counted = true;
        self.retries += 1;
        true
    }

    /// The stream closed. Returns whether a retry was counted.
    ///
    /// A close that follows an error belongs to the same failure and is not
    /// counted again.
    pub fn on_close(&mut self) -> bool {
        self.stream_attached = false;
        self.connected = false;
        self.is_connecting = false;
        self.state = ConnectionState::Idle;

        if self.failure_counted {
            self.failure_counted = false;
            return false;
        }
        self.retries += 1;
        true
    }

    /// Record disconnect intent. Returns whether a stream must be closed.
    pub fn request_disconnect(&mut self) -> bool {
        self.should_disconnect = true;
        if self.stream_attached {
            self.state = ConnectionState::Closing;
            return true;
        }
        false
    }

    fn terminate(&mut self) {
        self.is_connecting = false;
        self.state = ConnectionState::Terminated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries,
            ..Default::default()
        }
    }

    /// Drive one open attempt that closes without opening
    fn fail_once(fsm: &mut ConnectionStateMachine) -> ReconnectDecision {
        fsm.stream_requested();
        fsm.on_close();
        fsm.reconnect(false)
    }

    #[test]
    fn test_initial_state() {
        let fsm = ConnectionStateMachine::new(ReconnectPolicy::default());
        assert_eq!(fsm.state(), ConnectionState::Idle);
        assert_eq!(fsm.retries(), 0);
        assert!(!fsm.is_connected());
    }

    #[test]
    fn test_normal_connect_flow() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy::default());

        assert_eq!(fsm.reconnect(true), ReconnectDecision::OpenStream);
        assert!(fsm.is_connecting());

        fsm.stream_requested();
        assert_eq!(fsm.state(), ConnectionState::StreamConnecting);

        fsm.on_open();
        assert_eq!(fsm.state(), ConnectionState::Connected);
        assert!(fsm.is_connected());
        assert!(!fsm.is_connecting());
    }

    #[test]
    fn test_authentication_first() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy {
            use_authentication: true,
            ..Default::default()
        });
        assert_eq!(fsm.reconnect(true), ReconnectDecision::Authenticate);
        assert_eq!(fsm.state(), ConnectionState::Authenticating);
        assert_eq!(
            fsm.proceed(ReconnectDecision::OpenStream),
            ReconnectDecision::OpenStream
        );
        assert_eq!(fsm.state(), ConnectionState::StreamConnecting);
    }

    #[test]
    fn test_reentrant_reconnect_is_dropped() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy::default());
        fsm.reconnect(true);
        assert_eq!(fsm.reconnect(false), ReconnectDecision::InFlight);
    }

    #[test]
    fn test_attached_stream_is_closed_first() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy::default());
        fsm.reconnect(true);
        fsm.stream_requested();
        fsm.on_open();

        assert_eq!(fsm.reconnect(false), ReconnectDecision::CloseStream);
        assert_eq!(fsm.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_retries_exhausted_at_exact_count() {
        let mut fsm = ConnectionStateMachine::new(policy(Some(3)));
        fsm.reconnect(true);

        assert_eq!(fail_once(&mut fsm), ReconnectDecision::OpenStream);
        assert_eq!(fail_once(&mut fsm), ReconnectDecision::OpenStream);
        assert_eq!(fail_once(&mut fsm), ReconnectDecision::RetriesExhausted);
        assert_eq!(fsm.retries(), 3);
        assert_eq!(fsm.state(), ConnectionState::Terminated);
    }

    #[test]
    fn test_retries_survive_successful_reconnect() {
        let mut fsm = ConnectionStateMachine::new(policy(Some(2)));
        fsm.reconnect(true);
        fsm.stream_requested();
        fsm.on_open();
        fsm.on_close();
        assert_eq!(fsm.reconnect(false), ReconnectDecision::OpenStream);

        fsm.stream_requested();
        fsm.on_open();
        fsm.on_close();
        assert_eq!(fsm.reconnect(false), ReconnectDecision::RetriesExhausted);
    }

    #[test]
    fn test_error_then_close_counts_once() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy::default());
        fsm.reconnect(true);
        fsm.stream_requested();
        fsm.on_open();

        assert!(fsm.on_error());
        assert_eq!(fsm.state(), ConnectionState::Errored);
        assert!(!fsm.on_close());
        assert_eq!(fsm.retries(), 1);

        // Next episode is counted again
        fsm.reconnect(false);
        fsm.stream_requested();
        assert!(fsm.on_close());
        assert_eq!(fsm.retries(), 2);
    }

    #[test]
    fn test_reconnect_disabled() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy {
            reconnect: false,
            ..Default::default()
        });
        fsm.reconnect(true);
        assert_eq!(fail_once(&mut fsm), ReconnectDecision::ReconnectDisabled);
        assert!(ReconnectDecision::ReconnectDisabled.is_terminal());
    }

    #[test]
    fn test_disconnect_intent_is_consumed() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy::default());
        fsm.reconnect(true);
        fsm.stream_requested();
        fsm.on_open();

        assert!(fsm.request_disconnect());
        fsm.on_close();
        assert_eq!(fsm.reconnect(false), ReconnectDecision::DisconnectRequested);
        assert!(!fsm.disconnect_requested());

        // A later manual reconnect goes ahead
        assert_eq!(fsm.reconnect(false), ReconnectDecision::OpenStream);
    }

    #[test]
    fn test_initial_ignores_checks() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy {
            reconnect: false,
            max_retries: Some(0),
            use_authentication: false,
        });
        fsm.request_disconnect();
        assert_eq!(fsm.reconnect(true), ReconnectDecision::OpenStream);
        assert!(!fsm.disconnect_requested());
    }

    #[test]
    fn test_disconnect_during_login_abandons_attempt() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy {
            use_authentication: true,
            ..Default::default()
        });
        fsm.reconnect(true);
        assert!(!fsm.request_disconnect());

        assert_eq!(
            fsm.proceed(ReconnectDecision::OpenStream),
            ReconnectDecision::DisconnectRequested
        );
        assert_eq!(fsm.state(), ConnectionState::Terminated);
        assert!(!fsm.is_connecting());
    }

    #[test]
    fn test_login_failure_clears_connecting() {
        let mut fsm = ConnectionStateMachine::new(ReconnectPolicy {
            use_authentication: true,
            ..Default::default()
        });
        fsm.reconnect(true);
        fsm.login_failed();
        assert!(!fsm.is_connecting());
        assert_eq!(fsm.state(), ConnectionState::Idle);
        assert_eq!(fsm.retries(), 0);
    }
}
