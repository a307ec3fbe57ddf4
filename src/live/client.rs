use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, ServerEvent, ServerMessage, SetupMessage};
use crate::error::{BridgeError, Result};

/// Inbound traffic from an open connection, in arrival order
#[derive(Debug)]
pub enum LiveInbound {
    Event(ServerEvent),
    /// Network or protocol fault; the connection is unusable afterwards
    Error(BridgeError),
    /// The service closed the connection (close reason, if any)
    Closed(Option<String>),
}

/// Outbound half of an open connection
///
/// Sends are fire-and-forget: they queue immediately and are written as the
/// socket allows. Write failures come back as `LiveInbound::Error`.
pub trait LiveSender: Send {
    fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// Request a clean close; never waits for the handshake
    fn close(&mut self);
}

/// An open, configured connection
pub struct LiveChannel {
    pub sender: Box<dyn LiveSender>,
    pub inbound: mpsc::UnboundedReceiver<LiveInbound>,
}

/// Opens configured connections to the live service
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Connect, send `setup`, and resolve once the service acknowledges it
    async fn connect(&self, setup: SetupMessage) -> Result<LiveChannel>;
}

/// WebSocket connector for the Gemini Live `BidiGenerateContent` endpoint
pub struct GeminiLiveConnector {
    endpoint: String,
    api_key: String,
    connect_timeout: Duration,
}

impl GeminiLiveConnector {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            connect_timeout,
        }
    }
}

enum WriterCommand {
    Send(String),
    Close,
}

struct WebSocketSender {
    tx: mpsc::UnboundedSender<WriterCommand>,
    closed: bool,
}

impl LiveSender for WebSocketSender {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        if self.closed {
            return Err(BridgeError::Transport("connection already closed".to_string()));
        }

        let payload = serde_json::to_string(&message)
            .map_err(|e| BridgeError::Transport(format!("failed to encode message: {}", e)))?;

        self.tx
            .send(WriterCommand::Send(payload))
            .map_err(|_| BridgeError::Transport("connection writer has stopped".to_string()))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(WriterCommand::Close);
        }
    }
}

/// Extract a text payload from a frame (the service sends JSON as text or binary)
fn frame_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text),
        Message::Binary(data) => String::from_utf8(data).ok(),
        _ => None,
    }
}

fn parse_events(text: &str) -> Vec<ServerEvent> {
    match ServerMessage::parse(text) {
        Ok(message) => message.into_events(),
        Err(e) => {
            warn!("Failed to parse live service message: {}", e);
            Vec::new()
        }
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(&self, setup: SetupMessage) -> Result<LiveChannel> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);

        info!("Connecting to live service at {}", self.endpoint);

        let (socket, _response) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| BridgeError::Connection("timed out opening WebSocket".to_string()))?
            .map_err(|e| BridgeError::Connection(format!("WebSocket handshake failed: {}", e)))?;

        let (mut write, mut read) = socket.split();

        let setup_json = serde_json::to_string(&setup)
            .map_err(|e| BridgeError::Connection(format!("failed to encode setup: {}", e)))?;

        write
            .send(Message::Text(setup_json))
            .await
            .map_err(|e| BridgeError::Connection(format!("failed to send setup: {}", e)))?;

        debug!("Setup sent for model {}", setup.setup.model);

        // The connection is only usable once the service acknowledges the setup
        let handshake = async {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Close(close)) => {
                        let reason = close
                            .map(|f| format!("{} ({})", f.reason, f.code))
                            .unwrap_or_else(|| "no reason given".to_string());
                        return Err(BridgeError::Connection(format!("service closed during setup: {}", reason)));
                    }
                    Ok(message) => {
                        let Some(text) = frame_text(message) else { continue };
                        for event in parse_events(&text) {
                            match event {
                                ServerEvent::SetupComplete => return Ok(()),
                                ServerEvent::Error(message) => {
                                    return Err(BridgeError::Connection(format!("service rejected setup: {}", message)))
                                }
                                other => debug!("Ignoring pre-setup event: {:?}", other),
                            }
                        }
                    }
                    Err(e) => return Err(BridgeError::Connection(format!("read failed during setup: {}", e))),
                }
            }
            Err(BridgeError::Connection("connection ended before setup completed".to_string()))
        };

        timeout(self.connect_timeout, handshake)
            .await
            .map_err(|_| BridgeError::Connection("timed out waiting for setup acknowledgement".to_string()))??;

        info!("Live service session established");

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<WriterCommand>();

        // Reader: socket frames -> ordered inbound events
        let reader_tx = inbound_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Close(close)) => {
                        let reason = close.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                        info!("Live service closed the connection: {:?}", reason);
                        let _ = reader_tx.send(LiveInbound::Closed(reason));
                        return;
                    }
                    Ok(message) => {
                        let Some(text) = frame_text(message) else { continue };
                        for event in parse_events(&text) {
                            if reader_tx.send(LiveInbound::Event(event)).is_err() {
                                debug!("Inbound consumer gone, stopping reader");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        error!("Live connection read failed: {}", e);
                        let _ = reader_tx.send(LiveInbound::Error(BridgeError::Transport(e.to_string())));
                        return;
                    }
                }
            }
            let _ = reader_tx.send(LiveInbound::Closed(None));
        });

        // Writer: queued outbound messages -> socket
        tokio::spawn(async move {
            while let Some(command) = writer_rx.recv().await {
                match command {
                    WriterCommand::Send(payload) => {
                        if let Err(e) = write.send(Message::Text(payload)).await {
                            error!("Live connection write failed: {}", e);
                            let _ = inbound_tx.send(LiveInbound::Error(BridgeError::Transport(e.to_string())));
                            return;
                        }
                    }
                    WriterCommand::Close => break,
                }
            }

            debug!("Closing live connection");
            if let Err(e) = write.close().await {
                debug!("Close handshake did not complete: {}", e);
            }
        });

        Ok(LiveChannel {
            sender: Box::new(WebSocketSender {
                tx: writer_tx,
                closed: false,
            }),
            inbound: inbound_rx,
        })
    }
}
