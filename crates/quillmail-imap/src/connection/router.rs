//! Pending command table and response routing.
//!
//! Every in-flight command has an entry keyed by its tag. The read loop
//! classifies each complete line and applies one of three delivery rules:
//!
//! - untagged (`* ...`): appended to every pending command
//! - continuation (`+ ...`): handed to the most recently registered command,
//!   if it accepts continuations
//! - tagged (`<tag> ...`): appended to that tag's command, which is then
//!   completed and removed

use tokio::sync::{mpsc, oneshot};

use super::framed::literal_length;
use crate::command::TagGenerator;
use crate::types::Tag;
use crate::{Error, Result};

/// Classification of one complete response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLine<'a> {
    /// Blank line, ignored.
    Empty,
    /// Server data not tied to one command.
    Untagged,
    /// Continuation request; carries the trimmed text after `+`.
    Continuation(&'a str),
    /// Completion line for the command with this tag.
    Tagged(&'a str),
}

impl<'a> ResponseLine<'a> {
    /// Classifies a trimmed line.
    #[must_use]
    pub fn classify(line: &'a str) -> Self {
        if line.is_empty() {
            Self::Empty
        } else if line.starts_with('*') {
            Self::Untagged
        } else if let Some(rest) = line.strip_prefix('+') {
            Self::Continuation(rest.trim())
        } else {
            let tag = line.split_whitespace().next().unwrap_or(line);
            Self::Tagged(tag)
        }
    }
}

/// An in-flight command.
#[derive(Debug)]
struct PendingCommand {
    tag: Tag,
    lines: Vec<String>,
    completion: oneshot::Sender<Vec<String>>,
    continuation: Option<mpsc::UnboundedSender<String>>,
}

/// Receiving side of a registered command.
#[derive(Debug)]
pub struct Registration {
    /// Tag allocated to the command.
    pub tag: Tag,
    /// Resolves once with every line collected for the command, the tagged
    /// completion line last. Fails if the entry is dropped without completing.
    pub completion: oneshot::Receiver<Vec<String>>,
    /// Continuation prompts, if the command asked for them.
    pub continuation: Option<mpsc::UnboundedReceiver<String>>,
}

/// Tag-to-command correlation table.
///
/// Entries are kept in registration order so continuations can find the
/// most recent command.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Vec<PendingCommand>,
    tags: TagGenerator,
    closed: bool,
}

impl PendingTable {
    /// Creates an empty, open table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a tag and inserts a new entry for it.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` once the read loop has ended, or a protocol
    /// error if no tag is free.
    pub fn register(&mut self, wants_continuation: bool) -> Result<Registration> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        let entries = &self.entries;
        let tag = self
            .tags
            .next(|tag| entries.iter().any(|e| e.tag == *tag))
            .ok_or_else(|| Error::Protocol("no free command tag".to_string()))?;

        let (completion_tx, completion_rx) = oneshot::channel();
        let (continuation_tx, continuation_rx) = if wants_continuation {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        self.entries.push(PendingCommand {
            tag: tag.clone(),
            lines: Vec::new(),
            completion: completion_tx,
            continuation: continuation_tx,
        });

        Ok(Registration {
            tag,
            completion: completion_rx,
            continuation: continuation_rx,
        })
    }

    /// Routes one complete, trimmed response line.
    pub fn handle_line(&mut self, line: &str) {
        match ResponseLine::classify(line) {
            ResponseLine::Empty => {}
            ResponseLine::Untagged => {
                if let Some(len) = literal_length(line) {
                    tracing::debug!(len, "untagged line announces a literal");
                }
                for entry in &mut self.entries {
                    entry.lines.push(line.to_string());
                }
            }
            ResponseLine::Continuation(text) => {
                let Some(entry) = self.entries.last() else {
                    tracing::debug!("continuation with no pending command");
                    return;
                };
                match &entry.continuation {
                    Some(prompts) => {
                        let _ = prompts.send(text.to_string());
                    }
                    None => tracing::debug!(tag = %entry.tag, "continuation ignored"),
                }
            }
            ResponseLine::Tagged(tag) => {
                let Some(pos) = self.entries.iter().position(|e| e.tag == *tag) else {
                    tracing::warn!(tag, "dropping line for unknown tag");
                    return;
                };
                let mut entry = self.entries.remove(pos);
                entry.lines.push(line.to_string());
                tracing::trace!(tag, lines = entry.lines.len(), "command complete");
                let _ = entry.completion.send(entry.lines);
            }
        }
    }

    /// Removes an entry without completing it. Returns true if it existed.
    pub fn remove(&mut self, tag: &Tag) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.tag != *tag);
        self.entries.len() != before
    }

    /// Returns true if a command with this tag is outstanding.
    #[must_use]
    pub fn contains(&self, tag: &Tag) -> bool {
        self.entries.iter().any(|e| e.tag == *tag)
    }

    /// Number of outstanding commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no command is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true once the read loop has ended and closed the table.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drops every entry and refuses further registrations.
    ///
    /// Waiting callers observe their completion channel closing.
    pub fn close(&mut self) {
        self.closed = true;
        self.entries.clear();
    }

    /// Drops every entry and returns to the initial, open state.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.tags.reset();
        self.closed = false;
    }
}
