//! Core types for stream-chat
//!
//! This crate holds everything about a conversation that does not touch the
//! network: the message model, the wire frames, local persistence, the
//! session lifecycle and the reconciler that folds streamed frames into the
//! message log.

pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod protocol;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod utils;

pub use error::{Error, Result};
pub use message::{ChatMessage, Sender};
pub use protocol::{ClientFrame, ServerFrame};
pub use reconciler::{StreamReconciler, StreamState};
pub use session::{SessionManager, SessionSnapshot};
pub use store::{FileStore, LocalStore, MemoryStore};
