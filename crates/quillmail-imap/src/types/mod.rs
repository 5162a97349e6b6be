//! Core IMAP types.
//!
//! Tags, capabilities and the connection/TLS state enums shared by the
//! engine and its callers.

mod capability;
mod identifiers;
mod state;

pub use capability::{Capabilities, Capability};
pub use identifiers::Tag;
pub use state::{ConnectionState, TlsState};
