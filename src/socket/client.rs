use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, ServerMessage};
use crate::error::{VoiceError, VoiceResult};

/// Lifecycle of the voice socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Event delivered from the connection task to the session loop
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Opened,
    Message(ServerMessage),
    Closed { reason: Option<String> },
}

/// Something the capture pipeline can send audio through
pub trait Outbound {
    fn is_open(&self) -> bool;

    fn send(&mut self, message: ClientMessage) -> VoiceResult<()>;
}

/// Client side of the voice socket
///
/// Owns one connection for the lifetime of a session. There is no
/// reconnect: once closed, the socket stays closed.
pub struct SessionSocket {
    url: String,
    state: ConnectionState,
    outgoing: Option<mpsc::UnboundedSender<ClientMessage>>,
    task: Option<JoinHandle<()>>,
}

impl SessionSocket {
    /// Build the socket URL for a user, mapping http(s) bases to ws(s)
    pub fn endpoint(base_url: &str, user_id: &str) -> Result<String> {
        let base = base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            anyhow::bail!("Unsupported socket base URL: {}", base_url);
        };

        if user_id.is_empty() || user_id.contains('/') {
            anyhow::bail!("Invalid user id: {:?}", user_id);
        }

        Ok(format!("{}/ws/chat/{}", base, user_id))
    }

    /// Open the connection in the background
    ///
    /// Returns immediately in `Connecting`; the returned receiver yields
    /// `Opened` once the handshake completes and `Closed` exactly once at the
    /// end.
    pub fn open(url: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<SocketEvent>) {
        let url = url.into();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!("Connecting to {}", url);
        let task = tokio::spawn(run_connection(url.clone(), outgoing_rx, events_tx));

        (
            Self {
                url,
                state: ConnectionState::Connecting,
                outgoing: Some(outgoing_tx),
                task: Some(task),
            },
            events_rx,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Track an event coming out of the connection task
    pub fn apply(&mut self, event: &SocketEvent) {
        match event {
            SocketEvent::Opened => {
                if self.state == ConnectionState::Connecting {
                    self.state = ConnectionState::Open;
                }
            }
            SocketEvent::Closed { .. } => {
                self.state = ConnectionState::Closed;
                self.outgoing = None;
            }
            SocketEvent::Message(_) => {}
        }
    }

    /// Close the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if self.outgoing.take().is_some() {
            info!("Closing socket {}", self.url);
        }

        if self.state == ConnectionState::Connecting {
            // Nothing to flush yet
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }

        self.state = ConnectionState::Closed;
    }
}

impl Outbound for SessionSocket {
    fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    fn send(&mut self, message: ClientMessage) -> VoiceResult<()> {
        if !self.is_open() {
            return Err(VoiceError::NotConnected);
        }

        let outgoing = self.outgoing.as_ref().ok_or(VoiceError::NotConnected)?;
        outgoing
            .send(message)
            .map_err(|_| VoiceError::Connection("connection task has exited".into()))
    }
}

impl Drop for SessionSocket {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    url: String,
    mut outgoing_rx: mpsc::UnboundedReceiver<ClientMessage>,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            error!("Failed to connect to {}: {}", url, e);
            let _ = events_tx.send(SocketEvent::Closed {
                reason: Some(e.to_string()),
            });
            return;
        }
    };

    info!("Connected to {}", url);
    let _ = events_tx.send(SocketEvent::Opened);

    let (mut write, mut read) = stream.split();
    let mut reason = None;

    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => match outgoing {
                Some(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("Failed to serialize outgoing message: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        warn!("Socket send failed: {}", e);
                        reason = Some(e.to_string());
                        break;
                    }
                }
                None => {
                    // Session dropped its handle
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if events_tx.send(SocketEvent::Message(message)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Ignoring malformed server message: {}", e),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                    break;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    debug!("Ignoring {} byte binary frame", bytes.len());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Socket receive failed: {}", e);
                    reason = Some(e.to_string());
                    break;
                }
                None => break,
            },
        }
    }

    info!("Socket {} closed", url);
    let _ = events_tx.send(SocketEvent::Closed { reason });
}
