//! Wire frames exchanged over the duplex chat connection
//!
//! Inbound frames are JSON objects discriminated by a `type` field. Outbound
//! frames carry no discriminator: the server reads the first frame of a
//! connection as the handshake and every later one as a user turn.

use crate::message::Sender;
use crate::utils::truncate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Frame received from the assistant service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Assigns or confirms the session id
    Session { session_id: String },
    /// Begins a new assistant turn
    Start,
    /// Appends a fragment to the in-progress turn
    Chunk { content: String },
    /// Finalizes the in-progress turn
    End,
    /// Replays a complete prior message
    History { sender: Sender, text: String },
    /// Non-fatal server-side error notice
    Error { content: String },
}

impl ServerFrame {
    /// Parse a text frame.
    ///
    /// Unknown `type` values and frames with missing or mistyped fields yield
    /// `None`; callers drop them.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("Ignoring malformed frame ({}): {}", e, truncate(raw, 200));
                None
            }
        }
    }

    /// Short name of the frame type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Session { .. } => "session",
            ServerFrame::Start => "start",
            ServerFrame::Chunk { .. } => "chunk",
            ServerFrame::End => "end",
            ServerFrame::History { .. } => "history",
            ServerFrame::Error { .. } => "error",
        }
    }
}

/// Frame sent to the assistant service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    /// One user turn
    UserMessage {
        session_id: Option<String>,
        message: String,
    },
    /// Sent once when the connection opens
    Handshake { session_id: Option<String> },
}

impl ClientFrame {
    pub fn handshake(session_id: Option<String>) -> Self {
        ClientFrame::Handshake { session_id }
    }

    pub fn user_message(session_id: Option<String>, message: impl Into<String>) -> Self {
        ClientFrame::UserMessage {
            session_id,
            message: message.into(),
        }
    }

    /// Encode as a JSON text frame
    pub fn encode(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
