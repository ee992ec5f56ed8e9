//! Connection manager with login, persistent stream and automatic reconnection
//!
//! The manager is a handle to a single actor task. The actor owns the state
//! machine, the credential, the server's connection info and the open stream,
//! and is the only place any of them change. Stream events, login results and
//! backoff timers are all fed back into it as messages.

use crate::auth;
use crate::connection::{ConnectionEvent, ConnectionOptions};
use crate::error::ClientError;
use crate::request::{self, FetchBody, FetchOptions};
use crate::transport::{
    RequestTransport, ReqwestTransport, StreamConnector, StreamEvent, StreamEventSender,
    StreamLink, WebSocketConnector,
};
use crate::uri::{self, Endpoint};
use serde_json::Value;
use signalk_shared::codec::{self, InboundFrame, OutboundFrame};
use signalk_shared::state_machine::{ConnectionState, ConnectionStateMachine, ReconnectDecision};
use signalk_shared::{now_ms, ConnectionInfo, Credential};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Buffered events per receiver before it starts lagging
const EVENT_CAPACITY: usize = 1024;

/// Snapshot of the manager's state
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub is_connecting: bool,
    pub retries: u32,
    pub authenticated: bool,
    pub self_id: Option<String>,
    pub connection_info: Option<ConnectionInfo>,
    /// Receipt time of the last inbound frame (ms since Unix epoch)
    pub last_message_ms: Option<u64>,
}

enum Command {
    Reconnect,
    Disconnect,
    Send {
        frame: OutboundFrame,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    SetAuthenticated(Credential),
    Credential(oneshot::Sender<Option<Credential>>),
    Status(oneshot::Sender<ConnectionStatus>),
}

enum Internal {
    Login(Result<Credential, ClientError>),
    /// Backoff elapsed; continue with the pending step
    Resume(ReconnectDecision),
}

/// Manages the connection to a Signal K server
pub struct ConnectionManager {
    options: Arc<ConnectionOptions>,
    requests: Arc<dyn RequestTransport>,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Receiver<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a connection manager and start connecting
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        options: ConnectionOptions,
        connector: Arc<dyn StreamConnector>,
        requests: Arc<dyn RequestTransport>,
    ) -> Self {
        let options = Arc::new(options);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = broadcast::channel(EVENT_CAPACITY);

        let actor = ConnectionActor {
            fsm: ConnectionStateMachine::new(options.policy()),
            options: options.clone(),
            connector,
            requests: requests.clone(),
            credential: None,
            connection_info: None,
            self_id: None,
            last_message_ms: None,
            link: None,
            generation: 0,
            events: Some(events_tx),
            stream_tx,
            internal_tx,
        };
        tokio::spawn(actor.run(commands_rx, stream_rx, internal_rx));

        Self {
            options,
            requests,
            commands: commands_tx,
            events: events_rx,
        }
    }

    /// Connect over WebSocket and HTTP
    pub fn connect(options: ConnectionOptions) -> Self {
        Self::new(
            options,
            Arc::new(WebSocketConnector::new()),
            Arc::new(ReqwestTransport::new()),
        )
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Close the stream and stop reconnecting
    ///
    /// Takes effect when the stream's close event arrives.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Disconnect)
    }

    /// Trigger a reconnect attempt
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Reconnect)
    }

    /// Use a credential obtained elsewhere, skipping the login exchange
    ///
    /// `kind` defaults to the configured token type.
    pub fn set_authenticated(
        &self,
        token: impl Into<String>,
        kind: Option<&str>,
    ) -> Result<(), ClientError> {
        let kind = kind.unwrap_or(&self.options.bearer_token_type);
        self.command(Command::SetAuthenticated(Credential::new(kind, token)))
    }

    /// Write a frame to the stream
    pub async fn send(&self, frame: impl Into<OutboundFrame>) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            frame: frame.into(),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Call the HTTP API
    pub async fn fetch(&self, path: &str, opts: FetchOptions) -> Result<FetchBody, ClientError> {
        let credential = self.credential().await?;
        request::fetch(
            self.requests.as_ref(),
            &self.options,
            credential.as_ref(),
            path,
            opts,
        )
        .await
    }

    /// Currently held credential
    pub async fn credential(&self) -> Result<Option<Credential>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Credential(reply))?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    pub async fn status(&self) -> Result<ConnectionStatus, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Status(reply))?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Receive the next event
    ///
    /// Returns `None` once the manager has released its listeners.
    ///
    /// Events share one bounded buffer. A receiver that falls more than
    /// `EVENT_CAPACITY` events behind loses the oldest ones, lifecycle
    /// signals included; the loss is logged and receiving continues with
    /// the oldest event still buffered. Use [`status`](Self::status) to
    /// resynchronize after a lag.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event receiver lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// An additional receiver for events emitted from now on
    ///
    /// Raw receivers see `RecvError::Lagged` when they fall behind the
    /// shared buffer; see [`recv`](Self::recv).
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.resubscribe()
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::Closed)
    }
}

struct ConnectionActor {
    options: Arc<ConnectionOptions>,
    connector: Arc<dyn StreamConnector>,
    requests: Arc<dyn RequestTransport>,
    fsm: ConnectionStateMachine,
    credential: Option<Credential>,
    connection_info: Option<ConnectionInfo>,
    self_id: Option<String>,
    last_message_ms: Option<u64>,
    /// Attached stream and its generation
    link: Option<(u64, Box<dyn StreamLink>)>,
    generation: u64,
    /// `None` once listeners are released
    events: Option<broadcast::Sender<ConnectionEvent>>,
    stream_tx: mpsc::UnboundedSender<(u64, StreamEvent)>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl ConnectionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut stream_events: mpsc::UnboundedReceiver<(u64, StreamEvent)>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        self.reconnect(true);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some((generation, event)) = stream_events.recv() => {
                    self.handle_stream_event(generation, event);
                }
                Some(message) = internal.recv() => self.handle_internal(message),
            }
        }

        if let Some((_, link)) = self.link.take() {
            link.close();
        }
        debug!("[CONN] Manager dropped, actor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Reconnect => self.reconnect(false),
            Command::Disconnect => {
                info!("[CONN] Disconnect requested");
                if self.fsm.request_disconnect() {
                    self.close_link();
                }
            }
            Command::Send { frame, reply } => {
                let _ = reply.send(self.send(frame));
            }
            Command::SetAuthenticated(credential) => {
                info!("[AUTH] Using injected {} credential", credential.kind);
                self.credential = Some(credential);
                self.emit(ConnectionEvent::FetchReady);
            }
            Command::Credential(reply) => {
                let _ = reply.send(self.credential.clone());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn handle_stream_event(&mut self, generation: u64, event: StreamEvent) {
        match &self.link {
            Some((current, _)) if *current == generation => {}
            _ => {
                debug!("[CONN] Dropping {:?} from detached stream {}", event, generation);
                return;
            }
        }

        match event {
            StreamEvent::Open => {
                self.fsm.on_open();
                info!("[CONN] Connected via {}", self.connector.name());
                self.emit(ConnectionEvent::Connect);
            }
            StreamEvent::Message(text) => self.handle_message(text),
            StreamEvent::Error(reason) => {
                let counted = self.fsm.on_error();
                warn!(
                    "[CONN] Stream error: {} (retries={}, counted={})",
                    reason,
                    self.fsm.retries(),
                    counted
                );
                self.emit(ConnectionEvent::Error(ClientError::Transport(reason)));
                self.reconnect(false);
            }
            StreamEvent::Close => {
                self.link = None;
                self.fsm.on_close();
                info!("[CONN] Disconnected (retries={})", self.fsm.retries());
                self.emit(ConnectionEvent::Disconnect);
                self.reconnect(false);
            }
        }
    }

    fn handle_message(&mut self, text: String) {
        self.last_message_ms = Some(now_ms());

        let frame = match codec::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("[CONN] Passing frame through undecoded: {}", e);
                InboundFrame::Generic(Value::String(text))
            }
        };

        let payload = match frame {
            InboundFrame::Handshake { info, payload } => {
                self.set_connection_info(info);
                payload
            }
            InboundFrame::Generic(payload) => payload,
        };
        self.emit(ConnectionEvent::Message(payload));
    }

    fn set_connection_info(&mut self, info: ConnectionInfo) {
        info!(
            "[CONN] Server {} {} roles={:?}",
            info.name, info.version, info.roles
        );
        self.self_id = info.self_id().map(str::to_string);
        self.connection_info = Some(info.clone());
        self.emit(ConnectionEvent::ConnectionInfo(info));

        if let Some(self_id) = self.self_id.clone() {
            self.emit(ConnectionEvent::SelfId(self_id));
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Resume(next) => {
                let decision = self.fsm.proceed(next);
                self.act(decision);
            }
            Internal::Login(Ok(credential)) => {
                let decision = self.fsm.proceed(ReconnectDecision::OpenStream);
                if decision.is_terminal() {
                    info!("[AUTH] Login finished after disconnect request, not opening stream");
                    self.finish(decision);
                    return;
                }
                self.credential = Some(credential);
                self.emit(ConnectionEvent::FetchReady);
                self.open_stream();
            }
            Internal::Login(Err(e)) => {
                self.fsm.login_failed();
                error!("[AUTH] Login failed: {}", e);
                self.emit(ConnectionEvent::Error(e));
            }
        }
    }

    fn reconnect(&mut self, initial: bool) {
        let decision = self.fsm.reconnect(initial);
        match decision {
            ReconnectDecision::Authenticate | ReconnectDecision::OpenStream if !initial => {
                let delay = self.options.backoff_delay(self.fsm.retries());
                if delay.is_zero() {
                    self.act(decision);
                } else {
                    self.schedule_resume(decision, delay);
                }
            }
            _ => self.act(decision),
        }
    }

    fn act(&mut self, decision: ReconnectDecision) {
        match decision {
            ReconnectDecision::InFlight => debug!("[CONN] Reconnect already in flight"),
            ReconnectDecision::CloseStream => self.close_link(),
            ReconnectDecision::Authenticate => self.start_login(),
            ReconnectDecision::OpenStream => self.open_stream(),
            terminal => self.finish(terminal),
        }
    }

    fn schedule_resume(&self, next: ReconnectDecision, delay: Duration) {
        info!(
            "[CONN] Reconnecting in {:?} (retry {})",
            delay,
            self.fsm.retries()
        );
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::Resume(next));
        });
    }

    fn start_login(&self) {
        info!(
            "[AUTH] Logging in at {}",
            uri::build(&self.options, Endpoint::Request)
        );
        let requests = self.requests.clone();
        let options = self.options.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = auth::login(requests.as_ref(), &options).await;
            let _ = tx.send(Internal::Login(result));
        });
    }

    fn open_stream(&mut self) {
        self.generation += 1;
        let url = uri::build(&self.options, Endpoint::Stream);
        info!("[CONN] Opening {} stream {}", self.connector.name(), url);

        let events = StreamEventSender::new(self.generation, self.stream_tx.clone());
        let link = self.connector.open(&url, events);
        self.fsm.stream_requested();
        self.link = Some((self.generation, link));
    }

    fn close_link(&self) {
        if let Some((_, link)) = &self.link {
            link.close();
        }
    }

    fn send(&self, frame: OutboundFrame) -> Result<(), ClientError> {
        let link = match &self.link {
            Some((_, link)) if self.fsm.is_connected() => link,
            _ => return Err(ClientError::NotConnected),
        };

        let token = self.credential.as_ref().map(|c| c.token.as_str());
        let text = codec::encode(frame, token)?;
        debug!("[CONN] Sending {} byte frame", text.len());
        link.send(text).map_err(ClientError::transport)
    }

    /// Terminal decision: report it and release listeners
    fn finish(&mut self, decision: ReconnectDecision) {
        match decision {
            ReconnectDecision::RetriesExhausted => {
                warn!("[CONN] {}", ClientError::RetryExhausted(self.fsm.retries()));
                self.emit(ConnectionEvent::HitMaxRetries);
            }
            ReconnectDecision::ReconnectDisabled => {
                info!("[CONN] Reconnection disabled, stopping");
            }
            ReconnectDecision::DisconnectRequested => {
                info!("[CONN] Disconnected on request");
            }
            _ => {}
        }
        self.release();
    }

    fn release(&mut self) {
        if self.events.take().is_some() {
            debug!("[CONN] Listeners released");
        }
        self.credential = None;
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Some(events) = &self.events {
            debug!("[CONN] Emitting {}", event.name());
            // No receivers is fine
            let _ = events.send(event);
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.fsm.state(),
            connected: self.fsm.is_connected(),
            is_connecting: self.fsm.is_connecting(),
            retries: self.fsm.retries(),
            authenticated: self.credential.is_some(),
            self_id: self.self_id.clone(),
            connection_info: self.connection_info.clone(),
            last_message_ms: self.last_message_ms,
        }
    }
}
