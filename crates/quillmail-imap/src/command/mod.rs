//! IMAP command builder.
//!
//! Covers the "any state" and "not authenticated" command surface. The text
//! produced here is what follows the tag on the wire; the dispatcher adds the
//! tag and the trailing CRLF.

mod serialize;
mod tag_generator;

use std::fmt;

pub use tag_generator::TagGenerator;

use crate::sasl::AuthMechanism;
use serialize::write_quoted;

/// IMAP command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    // Any State Commands
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,

    // Not Authenticated State Commands
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE command.
    Authenticate {
        /// Authentication mechanism.
        mechanism: AuthMechanism,
        /// Initial response, already base64-encoded.
        initial_response: Option<String>,
    },
}

impl Command {
    /// Returns the command verb, safe to log.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capability | Self::Noop | Self::Logout | Self::StartTls => {
                f.write_str(self.name())
            }
            Self::Login { username, password } => {
                let mut buf = String::from("LOGIN ");
                write_quoted(&mut buf, username);
                buf.push(' ');
                write_quoted(&mut buf, password);
                f.write_str(&buf)
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                write!(f, "AUTHENTICATE {mechanism}")?;
                if let Some(resp) = initial_response {
                    write!(f, " {resp}")?;
                }
                Ok(())
            }
        }
    }
}

// Credentials stay out of debug output.
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Authenticate { mechanism, .. } => f
                .debug_struct("Authenticate")
                .field("mechanism", mechanism)
                .finish_non_exhaustive(),
            _ => f.write_str(self.name()),
        }
    }
}
