//! WebSocket client for the signaling relay
//!
//! Decodes inbound text frames into [`SignalingEvent`]s and encodes
//! [`SignalingCommand`]s out. Mesh logic never touches the socket; it only
//! sees the decoded event stream, which keeps event ordering in one place.

use super::protocol::{SignalingCommand, SignalingEvent};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket signaling client
pub struct SignalingClient {
    /// Relay server URL
    url: String,

    /// Outgoing frame sender (replaced on connect)
    tx: mpsc::UnboundedSender<Message>,
}

impl SignalingClient {
    /// Create a new signaling client
    ///
    /// # Arguments
    ///
    /// * `url` - WebSocket relay server URL (ws:// or wss://)
    pub fn new(url: &str) -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();

        Self {
            url: url.to_string(),
            tx,
        }
    }

    /// Connect to the relay server
    ///
    /// Establishes the WebSocket connection and starts background tasks for
    /// sending and receiving frames. Decoded events are delivered through
    /// `events`, starting with [`SignalingEvent::Connected`] and ending with
    /// [`SignalingEvent::Disconnected`] when the link drops.
    pub async fn connect(&mut self, events: mpsc::UnboundedSender<SignalingEvent>) -> Result<()> {
        info!("Connecting to signaling relay: {}", self.url);

        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling relay");
        let _ = events.send(SignalingEvent::Connected);

        let (write, read) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = tx;

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, events));

        Ok(())
    }

    /// Sender task: forwards frames from the channel to the WebSocket
    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket frame: {}", e);
                break;
            }
        }

        debug!("Signaling sender task terminated");
    }

    /// Receiver task: decodes WebSocket frames into signaling events
    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match SignalingEvent::from_json(&text) {
                    Ok(event) => {
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    // Malformed or unexpected messages are defensively ignored.
                    Err(e) => warn!("Ignoring signaling message: {}", e),
                },
                Ok(Message::Close(_)) => {
                    info!("Signaling relay closed the connection");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        let _ = events.send(SignalingEvent::Disconnected);
        debug!("Signaling receiver task terminated");
    }

    /// Send a command to the relay
    pub fn send(&self, command: SignalingCommand) -> Result<()> {
        let json = command.to_json()?;
        debug!("Sending signaling command: {}", json);

        self.tx
            .send(Message::Text(json))
            .map_err(|e| Error::SignalingError(format!("Failed to queue command: {}", e)))?;

        Ok(())
    }
}
