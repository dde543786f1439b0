//! Session identifier lifecycle
//!
//! The session id and the message log are persisted under two independent
//! keys. They are loaded together, written through on every change, and
//! cleared together.

pub mod manager;

pub use manager::{SessionManager, SessionSnapshot, MESSAGES_KEY, SESSION_ID_KEY};
