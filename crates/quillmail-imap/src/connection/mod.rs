//! IMAP connection management.
//!
//! This module provides the connection engine for IMAP servers, including:
//! - Configuration (host, port, certificate policy)
//! - TLS/plaintext stream abstraction and the transport boundary
//! - Line framing for server responses
//! - Tag correlation and routing of response lines to waiting commands
//! - The `Client` that ties these together

mod client;
mod config;
mod framed;
mod reader;
mod router;
mod stream;

pub use client::{Client, ContinuationHandler};
pub use config::{Config, ConfigBuilder, IMPLICIT_TLS_PORT, STARTTLS_PORT};
pub use framed::{LineReassembler, Lines, MAX_LINE_LENGTH, literal_length};
pub use router::{PendingTable, Registration, ResponseLine};
pub use stream::{
    ImapStream, TcpTransport, Transport, connect_plain, connect_tls, create_tls_connector,
};
