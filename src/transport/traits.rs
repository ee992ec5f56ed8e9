//! Transport trait abstraction for pluggable stream and request backends

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Events reported by an open stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Stream established
    Open,
    /// Text frame received
    Message(String),
    /// Stream failed; a `Close` follows
    Error(String),
    /// Stream closed
    Close,
}

/// Delivers events of one stream to the connection manager
///
/// Every stream gets its own generation number so that events from a stream
/// the manager already let go of can be told apart and dropped.
#[derive(Debug, Clone)]
pub struct StreamEventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, StreamEvent)>,
}

impl StreamEventSender {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, StreamEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Report an event. Returns false once the manager has gone away.
    pub fn emit(&self, event: StreamEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// Handle to an open (or opening) stream
pub trait StreamLink: Send + Sync {
    /// Queue a text frame
    fn send(&self, frame: String) -> Result<()>;

    /// Request the stream to close; a `Close` event follows
    fn close(&self);
}

/// Factory for stream connections
///
/// `open` returns immediately. Establishment, inbound frames, failures and
/// closure are reported through `events`.
pub trait StreamConnector: Send + Sync {
    fn open(&self, url: &str, events: StreamEventSender) -> Box<dyn StreamLink>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}

/// A unary request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Send ambient credentials along (cross-origin credentialed call)
    pub credentialed: bool,
}

/// Response to a unary request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// Look up a header, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

impl HttpResponse {
    /// Look up a header, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Backend for unary requests
#[async_trait]
pub trait RequestTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
