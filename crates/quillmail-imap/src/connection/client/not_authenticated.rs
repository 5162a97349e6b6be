//! Commands valid only in the not-authenticated state.

use std::sync::Arc;

use super::Client;
use crate::command::Command;
use crate::connection::reader::ReaderHandle;
use crate::connection::stream::Transport;
use crate::sasl::{AuthMechanism, LoginExchange, plain_response};
use crate::types::{Capability, ConnectionState, TlsState};
use crate::{Error, Result};

impl<T: Transport> Client<T> {
    /// Upgrades the connection with STARTTLS.
    ///
    /// Does nothing if TLS is already established or being negotiated.
    /// Capabilities are re-queried over the secured stream. Any failure
    /// leaves the TLS state at `None`.
    pub async fn start_tls(&self) -> Result<()> {
        {
            let mut session = self.session.lock();
            session.require("STARTTLS", ConnectionState::NotAuthenticated)?;
            if session.tls != TlsState::None {
                return Ok(());
            }
            if !session.capabilities.contains(&Capability::StartTls) {
                return Err(Error::InvalidRequest(
                    "server does not advertise STARTTLS".to_string(),
                ));
            }
            session.tls = TlsState::Processing;
        }

        let result = self.negotiate_tls().await;
        if let Err(e) = &result {
            tracing::warn!(%e, "STARTTLS failed");
            self.session.lock().tls = TlsState::None;
        }
        result
    }

    async fn negotiate_tls(&self) -> Result<()> {
        self.run(&Command::StartTls).await?;

        // Senders queue on the writer lock until the new stream is installed.
        let mut writer = self.writer.lock().await;
        let write = writer.take().ok_or(Error::NotConnected)?;
        let reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(Error::NotConnected)?;
        let read = match reader.stop().await {
            Ok(read) => read,
            Err(e) => {
                self.drop_session();
                return Err(e);
            }
        };

        let stream = read.unsplit(write);
        let stream = match self.transport.upgrade(stream, &self.config).await {
            Ok(stream) => stream,
            Err(e) => {
                self.drop_session();
                return Err(e);
            }
        };

        let (read, write) = tokio::io::split(stream);
        *writer = Some(write);
        *self.reader.lock().await = Some(ReaderHandle::spawn(
            read,
            Arc::clone(&self.pending),
            None,
        ));
        drop(writer);

        self.session.lock().tls = TlsState::Established;
        tracing::info!(host = %self.config.host, "TLS established");

        self.reload_capabilities().await?;
        Ok(())
    }

    /// Authenticates with AUTHENTICATE.
    ///
    /// Without `mechanism`, the strongest advertised mechanism this crate can
    /// run is chosen. On a plaintext connection that advertises no mechanism,
    /// STARTTLS is attempted first. A failed attempt leaves the state at
    /// not authenticated.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        mechanism: Option<AuthMechanism>,
    ) -> Result<()> {
        self.require_state("AUTHENTICATE", ConnectionState::NotAuthenticated)?;

        let (tls, mut caps) = {
            let session = self.session.lock();
            (session.tls, session.capabilities.clone())
        };
        if !tls.is_established() && caps.auth_mechanisms().next().is_none() {
            if !caps.contains(&Capability::StartTls) {
                return Err(Error::InvalidRequest(
                    "server advertises no authentication mechanism".to_string(),
                ));
            }
            self.start_tls().await?;
            caps = self.capabilities();
        }

        let mechanism = match mechanism {
            Some(requested) if caps.supports_auth(requested.name()) => requested,
            Some(requested) => {
                return Err(Error::InvalidRequest(format!(
                    "server does not advertise AUTH={requested}"
                )));
            }
            None => AuthMechanism::select(caps.auth_mechanisms()).ok_or_else(|| {
                Error::InvalidRequest("no supported authentication mechanism".to_string())
            })?,
        };

        tracing::debug!(%mechanism, "authenticating");
        let lines = match mechanism {
            AuthMechanism::Plain => {
                self.run(&Command::Authenticate {
                    mechanism,
                    initial_response: Some(plain_response(username, password)),
                })
                .await?
            }
            AuthMechanism::Login => {
                let command = Command::Authenticate {
                    mechanism,
                    initial_response: None,
                };
                self.send_command(
                    &command.to_string(),
                    Some(LoginExchange::new(username, password).into_handler()),
                )
                .await?
            }
            other => {
                return Err(Error::InvalidRequest(format!(
                    "{other} authentication is not supported"
                )));
            }
        };

        self.session.lock().state = ConnectionState::Authenticated;
        tracing::info!(user = username, %mechanism, "authenticated");
        self.reload_from_login_response(&lines).await?;
        Ok(())
    }

    /// Authenticates with LOGIN.
    ///
    /// Runs STARTTLS first unless TLS is already established; credentials
    /// are never sent in plaintext. Credentials containing CR, LF or NUL are
    /// refused with `InvalidRequest` before anything is sent.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.require_state("LOGIN", ConnectionState::NotAuthenticated)?;
        check_quotable("username", username)?;
        check_quotable("password", password)?;
        if !self.tls_state().is_established() {
            self.start_tls().await?;
        }
        if self.has_capability(&Capability::LoginDisabled) {
            return Err(Error::InvalidRequest(
                "server advertises LOGINDISABLED".to_string(),
            ));
        }

        let lines = self
            .run(&Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        self.session.lock().state = ConnectionState::Authenticated;
        tracing::info!(user = username, "logged in");
        self.reload_from_login_response(&lines).await?;
        Ok(())
    }
}

/// Quoted strings cannot carry CR, LF or NUL.
fn check_quotable(field: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(Error::InvalidRequest(format!(
            "{field} contains CR, LF or NUL"
        )));
    }
    Ok(())
}
