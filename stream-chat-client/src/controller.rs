//! Conversation controller
//!
//! Owns the session id and the message log. All mutation happens inside
//! `&mut self` methods driven by one task, so the log never sees concurrent
//! writers; every mutation is written through to the local store before the
//! method returns.

use crate::transport::{Result, Transport, TransportError, TransportEvent, WsConnection};
use std::sync::Arc;
use stream_chat_core::{
    ChatMessage, ClientFrame, LocalStore, ServerFrame, SessionManager, StreamReconciler,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What an applied event changed, for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Nothing visible changed
    Ignored,
    /// The connection finished its handshake
    Connected,
    /// The service assigned or confirmed the session id
    SessionAssigned(String),
    /// The message log changed
    LogChanged,
    /// The service reported a non-fatal error
    ServerError(String),
    /// The connection is gone; sends are no-ops until the next connect
    Disconnected(Option<String>),
}

/// Orchestrates session, transport and stream reconciliation
pub struct ConversationController {
    session: SessionManager,
    session_id: Option<String>,
    messages: Vec<ChatMessage>,
    reconciler: StreamReconciler,
    connection: Option<Box<dyn Transport>>,
    disposed: bool,
}

impl ConversationController {
    /// Create a controller, loading persisted state from `store`.
    ///
    /// The session manager is ready when this returns, so any connection
    /// opened afterwards carries the restored session id.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        let mut session = SessionManager::new(store);
        let snapshot = session.load();

        Self {
            session,
            session_id: snapshot.session_id,
            messages: snapshot.messages,
            reconciler: StreamReconciler::new(),
            connection: None,
            disposed: false,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Whether an assistant turn is in progress
    pub fn is_streaming(&self) -> bool {
        self.reconciler.is_streaming() || self.messages.iter().any(|m| m.is_typing)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_open())
    }

    /// Open a WebSocket connection to `url` with the current session id.
    ///
    /// Any existing connection is closed first. Events must be fed back
    /// through [`handle_event`](Self::handle_event).
    pub async fn connect(&mut self, url: &str) -> Result<mpsc::UnboundedReceiver<TransportEvent>> {
        if self.disposed {
            return Err(TransportError::Disposed);
        }
        self.drop_connection();

        let (connection, events) = WsConnection::open(url, self.session_id.clone()).await?;
        self.connection = Some(Box::new(connection));
        Ok(events)
    }

    /// Adopt an already-open transport, closing any existing one
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        if self.disposed {
            warn!("Ignoring transport attached after dispose");
            return;
        }
        self.drop_connection();
        self.connection = Some(transport);
    }

    /// Apply one transport event
    pub fn handle_event(&mut self, event: TransportEvent) -> Update {
        if self.disposed {
            debug!("Dropping event after dispose: {:?}", event);
            return Update::Ignored;
        }

        match event {
            TransportEvent::Opened => {
                info!("Connection open");
                Update::Connected
            }
            TransportEvent::Frame(ServerFrame::Session { session_id }) => {
                self.adopt_session(session_id)
            }
            TransportEvent::Frame(ServerFrame::Error { content }) => {
                warn!("Server reported an error: {}", content);
                Update::ServerError(content)
            }
            TransportEvent::Frame(frame) => {
                if self.reconciler.apply(&mut self.messages, &frame) {
                    self.session.persist_messages(&self.messages);
                    Update::LogChanged
                } else {
                    Update::Ignored
                }
            }
            TransportEvent::Closed => {
                info!("Connection closed");
                self.drop_connection();
                Update::Disconnected(None)
            }
            TransportEvent::Failed(reason) => {
                warn!("Connection failed: {}", reason);
                self.drop_connection();
                Update::Disconnected(Some(reason))
            }
        }
    }

    /// Send a user turn.
    ///
    /// A no-op returning `false` for blank text, without an open connection,
    /// or while a turn is streaming. Otherwise the message is appended to the
    /// log before it is transmitted. If the transport rejects the frame the
    /// echo is taken back out and `false` is returned.
    pub fn send_message(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        if self.is_streaming() {
            debug!("Ignoring send while a turn is streaming");
            return false;
        }
        let Some(connection) = self.connection.as_ref().filter(|c| c.is_open()) else {
            debug!("Ignoring send without an open connection");
            return false;
        };

        // Read the session id now, not when the connection was opened
        let frame = ClientFrame::user_message(self.session_id.clone(), text);

        self.messages.push(ChatMessage::user(text));
        if let Err(e) = connection.send(&frame) {
            warn!("Failed to send message: {}", e);
            self.messages.pop();
            return false;
        }
        self.session.persist_messages(&self.messages);
        true
    }

    /// Empty the log and forget the session, in memory and in the store
    pub fn clear_session(&mut self) {
        self.messages.clear();
        self.session_id = None;
        self.reconciler.reset();
        self.session.clear();
        info!("Session cleared");
    }

    /// Close the connection and stop applying events
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.disposed = true;
    }

    fn adopt_session(&mut self, session_id: String) -> Update {
        if session_id.trim().is_empty() {
            warn!("Ignoring blank session id from server");
            return Update::Ignored;
        }
        if self.session_id.as_deref() == Some(session_id.as_str()) {
            debug!("Session {} confirmed", session_id);
        } else {
            info!("Session {} assigned", session_id);
        }
        self.session.persist_session_id(&session_id);
        self.session_id = Some(session_id.clone());
        Update::SessionAssigned(session_id)
    }

    fn drop_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        if self.reconciler.interrupt(&mut self.messages) {
            info!("Finalized a turn cut off by the connection");
            self.session.persist_messages(&self.messages);
        }
    }
}

impl Drop for ConversationController {
    fn drop(&mut self) {
        self.dispose();
    }
}
