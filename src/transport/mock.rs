//! In-memory transports for tests

use crate::transport::traits::{
    HttpRequest, HttpResponse, RequestTransport, StreamConnector, StreamEvent, StreamEventSender,
    StreamLink,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// Test-side view of a stream the manager opened
#[derive(Clone)]
pub struct MockStream {
    pub url: String,
    events: StreamEventSender,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockStream {
    pub fn open(&self) {
        self.events.emit(StreamEvent::Open);
    }

    pub fn message(&self, text: &str) {
        self.events.emit(StreamEvent::Message(text.to_string()));
    }

    pub fn error(&self, reason: &str) {
        self.events.emit(StreamEvent::Error(reason.to_string()));
    }

    /// Server-side close
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.events.emit(StreamEvent::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Frames the manager wrote
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

struct MockLink {
    stream: MockStream,
}

impl StreamLink for MockLink {
    fn send(&self, frame: String) -> Result<()> {
        if self.stream.is_closed() {
            return Err(anyhow!("mock stream closed"));
        }
        self.stream.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.stream.close();
    }
}

/// Connector that hands every opened stream to the test
pub struct MockConnector {
    opened: mpsc::UnboundedSender<MockStream>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockStream>) {
        let (opened, rx) = mpsc::unbounded_channel();
        (Self { opened }, rx)
    }
}

impl StreamConnector for MockConnector {
    fn open(&self, url: &str, events: StreamEventSender) -> Box<dyn StreamLink> {
        let stream = MockStream {
            url: url.to_string(),
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let _ = self.opened.send(stream.clone());
        Box::new(MockLink { stream })
    }

    fn name(&self) -> &'static str {
        "mock-stream"
    }
}

/// Request transport answering from a script and recording every request
#[derive(Default)]
pub struct MockRequestTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    gate: Option<Arc<Notify>>,
}

impl MockRequestTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    /// Hold every response until the returned gate is notified
    pub fn gated(responses: Vec<HttpResponse>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let transport = Self {
            gate: Some(gate.clone()),
            ..Self::new(responses)
        };
        (transport, gate)
    }

    pub fn push(&self, response: HttpResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestTransport for MockRequestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted response"))
    }

    fn name(&self) -> &'static str {
        "mock-request"
    }
}

/// JSON response with the given status
pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        status_text: status_text(status).to_string(),
        headers: vec![(
            "content-type".to_string(),
            "application/json; charset=utf-8".to_string(),
        )],
        body: body.to_string(),
    }
}

/// Plain-text response with the given status
pub fn text_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        status_text: status_text(status).to_string(),
        headers: vec![("content-type".to_string(), "text/plain".to_string())],
        body: body.to_string(),
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}
