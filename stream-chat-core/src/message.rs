//! Message records held in the conversation log

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single entry in the conversation log
///
/// The serialized field names (`id`, `text`, `sender`, `isTyping`) are the
/// persisted format of the message-log key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Client-generated identifier, stable for the lifetime of the message
    pub id: String,
    /// Accumulated content
    pub text: String,
    /// Message author
    pub sender: Sender,
    /// True only while an assistant message is receiving chunks
    #[serde(default)]
    pub is_typing: bool,
}

impl ChatMessage {
    /// Create a finalized message with a fresh id
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            is_typing: false,
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// Create an empty assistant message that is still receiving chunks
    pub fn typing_assistant() -> Self {
        Self {
            is_typing: true,
            ..Self::new(Sender::Assistant, String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = ChatMessage::user("hi");
        let b = ChatMessage::user("hi");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_persisted_field_names() {
        let msg = ChatMessage::typing_assistant();
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["sender"], "assistant");
        assert_eq!(value["isTyping"], true);
        assert_eq!(value["text"], "");
    }

    #[test]
    fn test_missing_is_typing_defaults_to_false() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"id":"1","text":"hello","sender":"user"}"#).unwrap();
        assert_eq!(msg.sender, Sender::User);
        assert!(!msg.is_typing);
    }
}
