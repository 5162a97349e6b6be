//! SASL authentication exchanges.
//!
//! Implements:
//! - PLAIN (RFC 4616) - credentials sent inline with AUTHENTICATE
//! - LOGIN (draft-murchison-sasl-login) - username and password prompted
//!   through continuation requests

mod mechanism;

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub use mechanism::AuthMechanism;

use crate::connection::ContinuationHandler;
use crate::{Error, Result};

/// Base64 of `Username:`, the LOGIN mechanism's first prompt.
pub const LOGIN_USERNAME_PROMPT: &str = "VXNlcm5hbWU6";

/// Base64 of `Password:`, the LOGIN mechanism's second prompt.
pub const LOGIN_PASSWORD_PROMPT: &str = "UGFzc3dvcmQ6";

/// Generates PLAIN initial response (RFC 4616).
///
/// Format: `\0<username>\0<password>` (base64 encoded)
///
/// The authorization identity is left empty, meaning "same as the
/// authentication identity".
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Client side of the LOGIN mechanism.
///
/// Answers the two base64 prompts a server sends as continuation requests.
#[derive(Clone)]
pub struct LoginExchange {
    username: String,
    password: String,
}

impl LoginExchange {
    /// Creates an exchange for the given credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the base64 reply to one server prompt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidResponse` if the prompt is neither `Username:` nor
    /// `Password:` in base64.
    pub fn respond(&self, prompt: &str) -> Result<String> {
        match prompt {
            LOGIN_USERNAME_PROMPT => Ok(STANDARD.encode(self.username.as_bytes())),
            LOGIN_PASSWORD_PROMPT => Ok(STANDARD.encode(self.password.as_bytes())),
            other => Err(Error::InvalidResponse(format!(
                "unexpected LOGIN prompt: {other}"
            ))),
        }
    }

    /// Wraps the exchange as a continuation handler for the dispatcher.
    #[must_use]
    pub fn into_handler(self) -> ContinuationHandler {
        Box::new(move |prompt| self.respond(prompt))
    }
}

impl fmt::Debug for LoginExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginExchange")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
