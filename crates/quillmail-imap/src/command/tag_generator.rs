//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses.

use crate::types::Tag;

/// Tag generator for IMAP commands.
///
/// Generates 4-digit uppercase hexadecimal tags ("0001", "0002", ... "FFFF",
/// "0000", ...). The counter wraps after 65536 commands; a wrapped value that
/// is still held by an outstanding command is skipped.
///
/// The generator is not synchronized itself. It lives inside the pending
/// command table and is only advanced under that table's lock.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u16,
}

impl TagGenerator {
    /// Creates a new tag generator starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { counter: 1 }
    }

    /// Generates the next tag for which `in_use` returns false.
    ///
    /// Returns `None` only if every one of the 65536 tags is in use.
    pub fn next(&mut self, in_use: impl Fn(&Tag) -> bool) -> Option<Tag> {
        for _ in 0..=u32::from(u16::MAX) {
            let tag = Tag::new(format!("{:04X}", self.counter));
            self.counter = self.counter.wrapping_add(1);
            if !in_use(&tag) {
                return Some(tag);
            }
        }
        None
    }

    /// Resets the counter to its initial value.
    pub fn reset(&mut self) {
        self.counter = 1;
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
    }
}
