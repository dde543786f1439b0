//! Folds inbound frames into the message log
//!
//! Per assistant turn the reconciler moves `Idle -> Streaming -> Idle` on
//! `start` and `end`. While streaming, chunks accumulate in a buffer and the
//! last message in the log always mirrors the whole buffer.
//!
//! The log invariant maintained here: at most one message has
//! `is_typing == true`, it is the last element, and it is an assistant
//! message.

use crate::message::{ChatMessage, Sender};
use crate::protocol::ServerFrame;
use tracing::{debug, error, warn};

/// Whether an assistant turn is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming,
}

/// Stream state machine over the message log
#[derive(Debug, Default)]
pub struct StreamReconciler {
    state: StreamState,
    /// Text of the in-progress turn, reset on every `start`
    buffer: String,
}

impl StreamReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == StreamState::Streaming
    }

    /// Accumulated text of the in-progress turn
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Apply one frame to the log. Returns `true` if the log changed.
    ///
    /// `session` frames are not the reconciler's concern and leave the log
    /// untouched.
    pub fn apply(&mut self, log: &mut Vec<ChatMessage>, frame: &ServerFrame) -> bool {
        match frame {
            ServerFrame::Start => {
                if self.is_streaming() {
                    warn!("Turn started while another was streaming; finalizing the previous one");
                    finalize_last(log);
                }
                self.state = StreamState::Streaming;
                self.buffer.clear();
                log.push(ChatMessage::typing_assistant());
                true
            }
            ServerFrame::Chunk { content } => {
                if !self.is_streaming() {
                    debug!("Dropping chunk received outside a turn");
                    return false;
                }
                self.buffer.push_str(content);
                match in_progress(log) {
                    Some(msg) => {
                        msg.text.clone_from(&self.buffer);
                        true
                    }
                    None => {
                        warn!("Streaming without an in-progress message; chunk kept in buffer only");
                        false
                    }
                }
            }
            ServerFrame::End => {
                self.state = StreamState::Idle;
                finalize_last(log)
            }
            ServerFrame::History { sender, text } => {
                let msg = ChatMessage::new(*sender, text.clone());
                // Keep the typing message last
                if in_progress(log).is_some() {
                    let at = log.len() - 1;
                    log.insert(at, msg);
                } else {
                    log.push(msg);
                }
                true
            }
            ServerFrame::Error { content } => {
                error!("Server error: {}", content);
                false
            }
            ServerFrame::Session { .. } => false,
        }
    }

    /// Close out an in-progress turn whose connection went away.
    ///
    /// Returns `true` if a typing message was finalized.
    pub fn interrupt(&mut self, log: &mut [ChatMessage]) -> bool {
        self.state = StreamState::Idle;
        finalize_last(log)
    }

    /// Forget any turn in progress, used when the log is cleared
    pub fn reset(&mut self) {
        self.state = StreamState::Idle;
        self.buffer.clear();
    }

    /// Fold a recorded frame sequence into a fresh log
    pub fn replay<'a>(frames: impl IntoIterator<Item = &'a ServerFrame>) -> Vec<ChatMessage> {
        let mut reconciler = Self::new();
        let mut log = Vec::new();
        for frame in frames {
            reconciler.apply(&mut log, frame);
        }
        log
    }
}

fn in_progress(log: &mut [ChatMessage]) -> Option<&mut ChatMessage> {
    log.last_mut()
        .filter(|m| m.is_typing && m.sender == Sender::Assistant)
}

fn finalize_last(log: &mut [ChatMessage]) -> bool {
    match in_progress(log) {
        Some(msg) => {
            msg.is_typing = false;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(s: &str) -> ServerFrame {
        ServerFrame::Chunk {
            content: s.to_string(),
        }
    }

    fn history(sender: Sender, text: &str) -> ServerFrame {
        ServerFrame::History {
            sender,
            text: text.to_string(),
        }
    }

    fn assert_typing_invariant(log: &[ChatMessage]) {
        let typing: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_typing)
            .map(|(i, _)| i)
            .collect();
        assert!(typing.len() <= 1, "more than one typing message: {:?}", log);
        if let Some(&i) = typing.first() {
            assert_eq!(i, log.len() - 1, "typing message is not last: {:?}", log);
            assert_eq!(log[i].sender, Sender::Assistant);
        }
    }

    #[test]
    fn test_streamed_turn() {
        let log = StreamReconciler::replay(&[
            ServerFrame::Start,
            chunk("Hel"),
            chunk("lo"),
            ServerFrame::End,
        ]);

        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, Sender::Assistant);
        assert_eq!(log[0].text, "Hello");
        assert!(!log[0].is_typing);
    }

    #[test]
    fn test_finalized_text_is_concatenation_of_chunks() {
        let cases: Vec<Vec<&str>> = vec![
            vec![],
            vec![""],
            vec!["a"],
            vec!["multi ", "part ", "reply"],
            vec!["日本", "語", "", "✓"],
        ];

        for chunks in cases {
            let mut frames = vec![ServerFrame::Start];
            frames.extend(chunks.iter().map(|c| chunk(c)));
            frames.push(ServerFrame::End);

            let log = StreamReconciler::replay(&frames);
            assert_eq!(log.last().unwrap().text, chunks.concat());
            assert!(!log.last().unwrap().is_typing);
        }
    }

    #[test]
    fn test_message_is_typing_while_streaming() {
        let mut reconciler = StreamReconciler::new();
        let mut log = vec![ChatMessage::user("hi")];

        assert!(reconciler.apply(&mut log, &ServerFrame::Start));
        assert!(reconciler.is_streaming());
        assert!(log[1].is_typing);
        assert_eq!(log[1].text, "");

        assert!(reconciler.apply(&mut log, &chunk("Hel")));
        assert_eq!(log[1].text, "Hel");
        assert!(log[1].is_typing);
        assert_eq!(reconciler.buffer(), "Hel");
        assert_typing_invariant(&log);
    }

    #[test]
    fn test_chunk_while_idle_is_noop() {
        let mut reconciler = StreamReconciler::new();
        let mut log = vec![ChatMessage::new(Sender::Assistant, "done")];

        assert!(!reconciler.apply(&mut log, &chunk("stray")));
        assert_eq!(log[0].text, "done");
        assert_eq!(reconciler.state(), StreamState::Idle);
    }

    #[test]
    fn test_end_while_idle_is_noop() {
        let mut reconciler = StreamReconciler::new();
        let mut log = vec![ChatMessage::user("hi")];

        assert!(!reconciler.apply(&mut log, &ServerFrame::End));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_start_while_streaming_finalizes_previous() {
        let log = StreamReconciler::replay(&[
            ServerFrame::Start,
            chunk("first"),
            ServerFrame::Start,
            chunk("second"),
        ]);

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].text, "first");
        assert!(!log[0].is_typing);
        assert_eq!(log[1].text, "second");
        assert!(log[1].is_typing);
        assert_typing_invariant(&log);
    }

    #[test]
    fn test_history_replay() {
        let log = StreamReconciler::replay(&[
            history(Sender::User, "a"),
            history(Sender::Assistant, "b"),
        ]);

        assert_eq!(log.len(), 2);
        assert_eq!((log[0].sender, log[0].text.as_str()), (Sender::User, "a"));
        assert_eq!((log[1].sender, log[1].text.as_str()), (Sender::Assistant, "b"));
        assert!(log.iter().all(|m| !m.is_typing));
    }

    #[test]
    fn test_history_does_not_change_state() {
        let mut reconciler = StreamReconciler::new();
        let mut log = Vec::new();

        reconciler.apply(&mut log, &history(Sender::User, "a"));
        assert_eq!(reconciler.state(), StreamState::Idle);

        reconciler.apply(&mut log, &ServerFrame::Start);
        reconciler.apply(&mut log, &chunk("par"));
        reconciler.apply(&mut log, &history(Sender::Assistant, "old"));
        assert_eq!(reconciler.state(), StreamState::Streaming);
        assert_typing_invariant(&log);

        reconciler.apply(&mut log, &chunk("tial"));
        reconciler.apply(&mut log, &ServerFrame::End);

        let texts: Vec<&str> = log.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "old", "partial"]);
        assert!(log.iter().all(|m| !m.is_typing));
    }

    #[test]
    fn test_error_leaves_log_and_state_alone() {
        let mut reconciler = StreamReconciler::new();
        let mut log = Vec::new();
        reconciler.apply(&mut log, &ServerFrame::Start);
        reconciler.apply(&mut log, &chunk("x"));
        let before = log.clone();

        let changed = reconciler.apply(
            &mut log,
            &ServerFrame::Error {
                content: "boom".to_string(),
            },
        );
        assert!(!changed);
        assert_eq!(log, before);
        assert!(reconciler.is_streaming());
    }

    #[test]
    fn test_session_frame_is_ignored() {
        let mut reconciler = StreamReconciler::new();
        let mut log = Vec::new();
        let frame = ServerFrame::Session {
            session_id: "s1".to_string(),
        };
        assert!(!reconciler.apply(&mut log, &frame));
        assert!(log.is_empty());
    }

    #[test]
    fn test_interrupt_finalizes_in_progress_turn() {
        let mut reconciler = StreamReconciler::new();
        let mut log = Vec::new();
        reconciler.apply(&mut log, &ServerFrame::Start);
        reconciler.apply(&mut log, &chunk("cut"));

        assert!(reconciler.interrupt(&mut log));
        assert_eq!(reconciler.state(), StreamState::Idle);
        assert_eq!(log[0].text, "cut");
        assert!(!log[0].is_typing);

        assert!(!reconciler.interrupt(&mut log));
    }

    #[test]
    fn test_invariant_holds_over_mixed_sequence() {
        let frames = vec![
            history(Sender::User, "q1"),
            history(Sender::Assistant, "a1"),
            chunk("orphan"),
            ServerFrame::Start,
            chunk("a"),
            history(Sender::User, "late"),
            ServerFrame::Start,
            chunk("b"),
            ServerFrame::Error {
                content: "oops".to_string(),
            },
            ServerFrame::End,
            ServerFrame::End,
            chunk("after"),
        ];

        let mut reconciler = StreamReconciler::new();
        let mut log = Vec::new();
        for frame in &frames {
            reconciler.apply(&mut log, frame);
            assert_typing_invariant(&log);
        }
        assert_eq!(log.last().unwrap().text, "b");
    }
}
