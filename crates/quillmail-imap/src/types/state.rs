//! Protocol and TLS state types.
//!
//! `ConnectionState` follows the four states of RFC 3501 section 3.
//! `TlsState` tracks the transport security independently of it.

use std::fmt;

/// Protocol state of the connection.
///
/// Progression is forward only during a session: a successful LOGIN or
/// AUTHENTICATE moves to `Authenticated`; SELECT and LOGOUT (not all handled
/// by this engine) move further. Teardown resets to `NotAuthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Waiting for credentials.
    ///
    /// In this state, only these commands are valid:
    /// - CAPABILITY
    /// - NOOP
    /// - LOGOUT
    /// - STARTTLS
    /// - AUTHENTICATE
    /// - LOGIN
    #[default]
    NotAuthenticated,

    /// The user has logged in; mailbox commands become valid.
    Authenticated,

    /// A mailbox is open; message commands become valid.
    Selected,

    /// The connection is being closed.
    Logout,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotAuthenticated => "not authenticated",
            Self::Authenticated => "authenticated",
            Self::Selected => "selected",
            Self::Logout => "logout",
        })
    }
}

/// Security of the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsState {
    /// Plaintext transport.
    #[default]
    None,
    /// STARTTLS has been sent; only STARTTLS itself may be issued.
    Processing,
    /// The transport is encrypted (implicit TLS or a completed STARTTLS).
    Established,
}

impl TlsState {
    /// Returns `true` once the transport is encrypted.
    #[must_use]
    pub const fn is_established(self) -> bool {
        matches!(self, Self::Established)
    }
}
