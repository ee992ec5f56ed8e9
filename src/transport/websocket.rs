//! WebSocket stream transport over tokio-tungstenite

use crate::transport::traits::{StreamConnector, StreamEvent, StreamEventSender, StreamLink};
use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Default timeout for establishing the WebSocket
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

enum LinkCommand {
    Frame(String),
    Close,
}

/// Link to a socket task
pub struct WebSocketLink {
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl StreamLink for WebSocketLink {
    fn send(&self, frame: String) -> Result<()> {
        self.commands
            .send(LinkCommand::Frame(frame))
            .map_err(|_| anyhow!("WebSocket closed"))
    }

    fn close(&self) {
        let _ = self.commands.send(LinkCommand::Close);
    }
}

/// WebSocket connector; each `open` spawns a socket task
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set a custom timeout for the opening handshake
    pub fn with_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConnector for WebSocketConnector {
    fn open(&self, url: &str, events: StreamEventSender) -> Box<dyn StreamLink> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(
            url.to_string(),
            self.connect_timeout,
            commands_rx,
            events,
        ));
        Box::new(WebSocketLink {
            commands: commands_tx,
        })
    }

    fn name(&self) -> &'static str {
        "WebSocket"
    }
}

/// Socket task: connect, then pump frames both ways until closed
async fn run_socket(
    url: String,
    connect_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: StreamEventSender,
) {
    let connecting = timeout(connect_timeout, connect_async(url.as_str()));
    tokio::pin!(connecting);

    let ws = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok(Ok((ws, _))) => break ws,
                Ok(Err(e)) => {
                    events.emit(StreamEvent::Error(format!("Connect to {} failed: {}", url, e)));
                    events.emit(StreamEvent::Close);
                    return;
                }
                Err(_) => {
                    events.emit(StreamEvent::Error(format!("Timeout connecting to {}", url)));
                    events.emit(StreamEvent::Close);
                    return;
                }
            },
            command = commands.recv() => match command {
                // Frames are only accepted once open
                Some(LinkCommand::Frame(_)) => continue,
                Some(LinkCommand::Close) | None => {
                    debug!("Stream closed while connecting to {}", url);
                    events.emit(StreamEvent::Close);
                    return;
                }
            },
        }
    };

    events.emit(StreamEvent::Open);
    let (mut writer, mut reader) = ws.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Frame(text)) => {
                    if let Err(e) = writer.send(Message::Text(text)).await {
                        events.emit(StreamEvent::Error(format!("Write error: {}", e)));
                        break;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    let _ = writer.close().await;
                    break;
                }
            },

            message = reader.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    events.emit(StreamEvent::Message(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    events.emit(StreamEvent::Message(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Server closed stream: {:?}", frame);
                    break;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Read error on {}: {}", url, e);
                    events.emit(StreamEvent::Error(format!("Read error: {}", e)));
                    break;
                }
                None => break,
            },
        }
    }

    events.emit(StreamEvent::Close);
}
