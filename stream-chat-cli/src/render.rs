//! Plain-text transcript rendering
//!
//! Messages are printed once, in log order. A typing message is printed
//! incrementally: each refresh writes only the text appended since the last
//! one, so a streamed reply appears token by token on one line.

use console::style;
use std::io::{self, Write};
use stream_chat_core::{ChatMessage, Sender};

#[derive(Debug, Default)]
pub struct Transcript {
    /// Messages fully printed
    shown: usize,
    /// A message still receiving chunks
    partial: Option<Partial>,
}

#[derive(Debug)]
struct Partial {
    id: String,
    /// Bytes of its text already printed
    printed: usize,
    /// Whether the cursor still sits at the end of its line
    line_open: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget what was printed, after the log was cleared
    pub fn reset(&mut self) {
        self.shown = 0;
        self.partial = None;
    }

    /// Print whatever part of `messages` has not been printed yet
    pub fn refresh<W: Write>(&mut self, messages: &[ChatMessage], out: &mut W) -> io::Result<()> {
        if self.shown > messages.len() {
            self.reset();
        }

        while let Some(msg) = messages.get(self.shown) {
            let resumed = self
                .partial
                .as_ref()
                .filter(|p| p.id == msg.id)
                .map(|p| (p.printed, p.line_open));

            match resumed {
                Some((_, true)) => {}
                Some((_, false)) => write!(out, "{} ", label(msg.sender))?,
                None => {
                    // Something was inserted ahead of the streaming message
                    if let Some(p) = self.partial.as_mut().filter(|p| p.line_open) {
                        writeln!(out)?;
                        p.line_open = false;
                    }
                    write!(out, "{} ", label(msg.sender))?;
                }
            }

            let offset = resumed.map_or(0, |(printed, _)| printed);
            write!(out, "{}", msg.text.get(offset..).unwrap_or_default())?;

            if msg.is_typing {
                self.partial = Some(Partial {
                    id: msg.id.clone(),
                    printed: msg.text.len(),
                    line_open: true,
                });
                break;
            }
            writeln!(out)?;
            if resumed.is_some() {
                self.partial = None;
            }
            self.shown += 1;
        }
        out.flush()
    }
}

fn label(sender: Sender) -> String {
    match sender {
        Sender::User => style("you>").green().bold().to_string(),
        Sender::Assistant => style("assistant>").cyan().bold().to_string(),
    }
}
