//! Conversation client for stream-chat
//!
//! [`WsConnection`] wraps one WebSocket connection bound to a session and
//! turns inbound text frames into [`TransportEvent`]s. The
//! [`ConversationController`] owns the session id and message log, feeds
//! those events through the stream reconciler and writes every change
//! through to the local store.

pub mod controller;
pub mod transport;

pub use controller::{ConversationController, Update};
pub use transport::{Transport, TransportError, TransportEvent, WsConnection};
