//! Duplex transport to the assistant service
//!
//! One [`WsConnection`] is one WebSocket bound to one session. Opening it
//! sends the handshake frame; afterwards a reader task parses inbound text
//! frames and forwards them, in wire order, on an unbounded channel that the
//! owner drains. A writer task owns the sink half so [`Transport::send`]
//! never blocks.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stream_chat_core::{ClientFrame, ServerFrame};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

/// Lifecycle and data events emitted by a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open and the handshake has been sent
    Opened,
    /// A well-formed inbound frame
    Frame(ServerFrame),
    /// The peer closed the connection; terminal
    Closed,
    /// The connection broke; terminal
    Failed(String),
}

impl TransportEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Closed | TransportEvent::Failed(_))
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection not open")]
    NotOpen,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Encode error: {0}")]
    Encode(#[from] stream_chat_core::Error),

    #[error("Controller disposed")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Outbound half of a connection as seen by its owner
pub trait Transport: Send {
    /// Whether frames can currently be sent
    fn is_open(&self) -> bool;

    /// Queue a frame for sending
    fn send(&self, frame: &ClientFrame) -> Result<()>;

    /// Close the connection. Closing an already-closed connection is a no-op.
    fn close(&mut self);
}

/// WebSocket connection bound to one session
pub struct WsConnection {
    url: String,
    outbound_tx: mpsc::UnboundedSender<WsMessage>,
    /// Cleared by the reader when the peer goes away
    open: Arc<AtomicBool>,
    closed: bool,
    reader: JoinHandle<()>,
}

impl WsConnection {
    /// Connect to `url` and send the handshake carrying `session_id`.
    ///
    /// The returned receiver yields [`TransportEvent::Opened`] first, then
    /// inbound frames, then at most one terminal event.
    pub async fn open(
        url: &str,
        session_id: Option<String>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        info!("Connecting to {}", url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            error!("Failed to connect to {}: {}", url, e);
            TransportError::ConnectionFailed(e.to_string())
        })?;
        let (mut write, mut read) = ws_stream.split();

        let handshake = ClientFrame::handshake(session_id.clone()).encode()?;
        write
            .send(WsMessage::Text(handshake))
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        info!("Connected to {} (session_id: {:?})", url, session_id);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(TransportEvent::Opened);

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = write.send(msg).await {
                    warn!("WebSocket write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let open = Arc::new(AtomicBool::new(true));
        let reader_open = Arc::clone(&open);
        let reader = tokio::spawn(async move {
            let terminal = loop {
                match read.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        let Some(frame) = ServerFrame::parse(&text) else {
                            continue;
                        };
                        debug!("Received {} frame", frame.kind());
                        if event_tx.send(TransportEvent::Frame(frame)).is_err() {
                            break None;
                        }
                    }
                    Some(Ok(WsMessage::Close(close))) => {
                        info!("Connection closed by server: {:?}", close);
                        break Some(TransportEvent::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break Some(TransportEvent::Failed(e.to_string()));
                    }
                    None => {
                        info!("Connection stream ended");
                        break Some(TransportEvent::Closed);
                    }
                }
            };
            reader_open.store(false, Ordering::SeqCst);
            if let Some(event) = terminal {
                let _ = event_tx.send(event);
            }
        });

        Ok((
            Self {
                url: url.to_string(),
                outbound_tx,
                open,
                closed: false,
                reader,
            },
            event_rx,
        ))
    }
}

impl Transport for WsConnection {
    fn is_open(&self) -> bool {
        !self.closed && self.open.load(Ordering::SeqCst)
    }

    fn send(&self, frame: &ClientFrame) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let text = frame.encode()?;
        self.outbound_tx
            .send(WsMessage::Text(text))
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open.store(false, Ordering::SeqCst);
        // Nothing read after this point reaches the owner
        self.reader.abort();
        let _ = self.outbound_tx.send(WsMessage::Close(None));
        info!("Closed connection to {}", self.url);
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(TransportEvent::Closed.is_terminal());
        assert!(TransportEvent::Failed("reset".to_string()).is_terminal());
        assert!(!TransportEvent::Opened.is_terminal());
        assert!(!TransportEvent::Frame(ServerFrame::Start).is_terminal());
    }

    #[tokio::test]
    async fn test_open_unreachable_endpoint_fails() {
        // Bind then drop a listener to get a port with nothing behind it
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnection::open(&format!("ws://{}/ws/chat", addr), None).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
