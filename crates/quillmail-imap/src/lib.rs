//! # quillmail-imap
//!
//! Asynchronous IMAP client connection engine (RFC 3501).
//!
//! ## Features
//!
//! - **Concurrent commands**: every call on a [`Client`] takes `&self`;
//!   responses are correlated to callers by tag, and untagged server data is
//!   delivered to every command pending when it arrives
//! - **STARTTLS**: in-place upgrade of a plaintext session, with the read
//!   loop quiesced around the stream swap
//! - **SASL**: PLAIN and LOGIN exchanges, with mechanism selection ranked by
//!   strength
//! - **TLS via rustls**: Secure connections without OpenSSL dependency
//!
//! ## Quick Start
//!
//! ```no_run
//! use quillmail_imap::{Client, Config};
//!
//! # async fn run() -> quillmail_imap::Result<()> {
//! let client = Client::new(Config::new("imap.example.com"));
//! client.connect().await?;
//! println!("capabilities: {}", client.capabilities());
//!
//! client.login("user@example.com", "password").await?;
//! client.noop().await?;
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌─────────────────────┐
//! │   NotAuthenticated  │ ─── login()/authenticate() ───→ Authenticated
//! └─────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    Authenticated    │
//! └─────────────────────┘
//!            │
//!            ▼
//!         logout() ───→ Logout, then back to NotAuthenticated on teardown
//! ```
//!
//! TLS state is tracked separately: `None` → `Processing` (while STARTTLS is
//! in flight, no other command may be sent) → `Established`.
//!
//! ## Modules
//!
//! - [`command`]: IMAP command builders and tag generation
//! - [`connection`]: Transport, framing, routing and the client engine
//! - [`sasl`]: Authentication mechanisms and exchanges
//! - [`types`]: Capabilities, states and identifiers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod sasl;
pub mod types;

pub use command::{Command, TagGenerator};
pub use connection::{Client, Config, ConfigBuilder, ContinuationHandler, ImapStream, Transport};
pub use error::{Error, Result};
pub use sasl::AuthMechanism;
pub use types::{Capabilities, Capability, ConnectionState, Tag, TlsState};
