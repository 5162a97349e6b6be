//! Error types for the IMAP engine.

use std::time::Duration;

use thiserror::Error;

use crate::types::ConnectionState;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Connecting to the server took too long.
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// A command was issued without an open transport.
    #[error("Not connected")]
    NotConnected,

    /// `connect` was called on an engine that already holds a transport.
    #[error("Already connected")]
    AlreadyConnected,

    /// A command other than STARTTLS was issued while TLS negotiation runs.
    #[error("TLS negotiation in progress")]
    TlsBusy,

    /// The read loop ended while the command was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed or empty terminal line, bad greeting, or unexpected
    /// continuation payload.
    #[error("Invalid response: {0:?}")]
    InvalidResponse(String),

    /// Server returned BAD.
    #[error("Server returned BAD: {0}")]
    BadResponse(String),

    /// Server returned NO.
    #[error("Server returned NO: {0}")]
    NoResponse(String),

    /// A capability refresh produced an empty set. Carries the response lines.
    #[error("Server advertised no capabilities ({} response lines)", .0.len())]
    InvalidCapabilities(Vec<String>),

    /// Command issued outside the protocol state it requires.
    #[error("{command} requires state {required}, connection is {current}")]
    BadState {
        /// Command that was refused.
        command: &'static str,
        /// State the connection was in.
        current: ConnectionState,
        /// State the command requires.
        required: ConnectionState,
    },

    /// Command refused because of the server's capabilities.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Framing violation (over-long line, exhausted tag space).
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
