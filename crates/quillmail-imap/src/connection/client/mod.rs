//! IMAP client engine.
//!
//! One `Client` drives one connection. All methods take `&self`, so commands
//! may be issued from several tasks at once; each call suspends only its own
//! caller until the server completes its tag.
//!
//! Internally:
//!
//! - a background read loop ([`ReaderHandle`]) owns the read half of the
//!   stream and routes every line into the [`PendingTable`];
//! - the write half sits behind an async mutex that also covers tag
//!   allocation, so "allocate tag, register, write" is one critical section;
//! - protocol state, TLS state and the capability cache sit behind a sync
//!   mutex that is never held across an await.

#![allow(clippy::missing_errors_doc)]

mod not_authenticated;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{Mutex as AsyncMutex, oneshot};

use super::config::Config;
use super::reader::ReaderHandle;
use super::router::{PendingTable, Registration};
use super::stream::{TcpTransport, Transport};
use crate::command::Command;
use crate::types::{Capabilities, Capability, ConnectionState, Tag, TlsState};
use crate::{Error, Result};

/// Callback answering continuation requests (`+ ...`) for one command.
///
/// Receives the text after the `+` marker and returns the line to send back,
/// without CRLF. Returning an error aborts the command.
pub type ContinuationHandler = Box<dyn FnMut(&str) -> Result<String> + Send>;

/// Session state other than the stream itself.
#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    state: ConnectionState,
    tls: TlsState,
    capabilities: Capabilities,
}

impl SessionState {
    fn require(&self, command: &'static str, required: ConnectionState) -> Result<()> {
        if self.state == required {
            Ok(())
        } else {
            Err(Error::BadState {
                command,
                current: self.state,
                required,
            })
        }
    }
}

/// IMAP client connection.
pub struct Client<T: Transport = TcpTransport> {
    config: Config,
    transport: T,
    session: Mutex<SessionState>,
    pending: Arc<Mutex<PendingTable>>,
    writer: AsyncMutex<Option<WriteHalf<T::Stream>>>,
    reader: AsyncMutex<Option<ReaderHandle<T::Stream>>>,
}

impl<T: Transport> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("session", &*self.session.lock())
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl Client<TcpTransport> {
    /// Creates a client that connects over TCP with rustls.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_transport(config, TcpTransport)
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client over a custom transport.
    #[must_use]
    pub fn with_transport(config: Config, transport: T) -> Self {
        Self {
            config,
            transport,
            session: Mutex::new(SessionState::default()),
            pending: Arc::new(Mutex::new(PendingTable::new())),
            writer: AsyncMutex::new(None),
            reader: AsyncMutex::new(None),
        }
    }

    /// Returns the connection configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true while a transport is attached and the server has not
    /// closed it.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.lock().connected && !self.pending.lock().is_closed()
    }

    /// Returns the protocol state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.lock().state
    }

    /// Returns the TLS state.
    #[must_use]
    pub fn tls_state(&self) -> TlsState {
        self.session.lock().tls
    }

    /// Returns a snapshot of the cached server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.session.lock().capabilities.clone()
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn has_capability(&self, cap: &Capability) -> bool {
        self.session.lock().capabilities.contains(cap)
    }

    /// Fails with `BadState` unless the connection is in `required`.
    pub fn require_state(&self, command: &'static str, required: ConnectionState) -> Result<()> {
        self.session.lock().require(command, required)
    }

    /// Opens the transport, validates the greeting and loads capabilities.
    ///
    /// Port 993 connects with implicit TLS; any other port starts plaintext.
    pub async fn connect(&self) -> Result<()> {
        self.release_if_lost().await;
        {
            let mut session = self.session.lock();
            if session.connected {
                return Err(Error::AlreadyConnected);
            }
            session.connected = true;
        }

        let implicit_tls = self.config.implicit_tls();
        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            self.transport.connect(&self.config),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.session.lock().connected = false;
                return Err(e);
            }
            Err(_) => {
                self.session.lock().connected = false;
                return Err(Error::Timeout(self.config.connect_timeout));
            }
        };

        let (greeting_tx, greeting_rx) = oneshot::channel();
        self.attach(stream, Some(greeting_tx)).await;
        self.session.lock().tls = if implicit_tls {
            TlsState::Established
        } else {
            TlsState::None
        };

        let greeting = match tokio::time::timeout(self.config.connect_timeout, greeting_rx).await {
            Ok(greeting) => greeting.unwrap_or_default(),
            Err(_) => {
                self.teardown().await;
                return Err(Error::Timeout(self.config.connect_timeout));
            }
        };
        if !greeting.starts_with("* OK") {
            tracing::warn!(greeting = %greeting, "unexpected server greeting");
            self.teardown().await;
            return Err(Error::InvalidResponse(greeting));
        }
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            implicit_tls,
            "connected"
        );

        self.reload_capabilities().await?;
        Ok(())
    }

    /// Sends one tagged command and waits for its completion.
    ///
    /// `command` is the text after the tag. If `on_continuation` is given,
    /// every continuation request addressed to this command is passed to it
    /// and its reply is written back.
    ///
    /// On success, returns every line collected for the command: the untagged
    /// lines received while it was pending, then its tagged completion line.
    ///
    /// While STARTTLS negotiation is in progress only `STARTTLS` itself may be
    /// sent. Command text must not contain CR or LF. Dropping the returned
    /// future removes the pending entry.
    pub async fn send_command(
        &self,
        command: &str,
        on_continuation: Option<ContinuationHandler>,
    ) -> Result<Vec<String>> {
        if self.session.lock().tls == TlsState::Processing && command != "STARTTLS" {
            return Err(Error::TlsBusy);
        }
        reject_line_breaks(command)?;
        self.release_if_lost().await;

        let verb = command.split_whitespace().next().unwrap_or_default();
        let (registration, guard) = {
            let mut writer = self.writer.lock().await;
            let stream = writer.as_mut().ok_or(Error::NotConnected)?;
            let registration = self
                .pending
                .lock()
                .register(on_continuation.is_some())?;
            let guard = PendingGuard::new(&self.pending, registration.tag.clone());
            tracing::debug!(tag = %registration.tag, command = verb, "sending command");
            let line = format!("{} {command}\r\n", registration.tag);
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await?;
            (registration, guard)
        };
        let Registration {
            tag,
            mut completion,
            continuation,
        } = registration;

        let lines = match (continuation, on_continuation) {
            (Some(mut prompts), Some(mut handler)) => loop {
                tokio::select! {
                    biased;
                    lines = &mut completion => break lines,
                    Some(prompt) = prompts.recv() => match handler(&prompt) {
                        Ok(reply) => self.write_continuation(&reply).await?,
                        Err(e) => {
                            // Cancel the exchange; the server's BAD arrives
                            // after the entry is gone and is dropped.
                            let _ = self.write_continuation("*").await;
                            return Err(e);
                        }
                    },
                }
            },
            _ => completion.await,
        };
        guard.disarm();

        let lines = lines.map_err(|_| Error::ConnectionClosed)?;
        tracing::debug!(%tag, command = verb, lines = lines.len(), "command complete");
        completion_result(lines)
    }

    /// Sends a typed command without continuation handling.
    pub(crate) async fn run(&self, command: &Command) -> Result<Vec<String>> {
        self.send_command(&command.to_string(), None).await
    }

    /// Sends a CAPABILITY command and returns its response lines.
    pub async fn capability(&self) -> Result<Vec<String>> {
        self.run(&Command::Capability).await
    }

    /// Sends a NOOP command.
    pub async fn noop(&self) -> Result<()> {
        self.run(&Command::Noop).await.map(|_| ())
    }

    /// Re-queries the server and replaces the capability cache.
    ///
    /// Fails with `InvalidCapabilities` if the server advertised nothing; the
    /// cache is left empty in that case.
    pub async fn reload_capabilities(&self) -> Result<Capabilities> {
        self.session.lock().capabilities.clear();
        let lines = self.capability().await?;
        self.store_capabilities(lines)
    }

    /// Refreshes capabilities after LOGIN or AUTHENTICATE.
    ///
    /// Uses the `* CAPABILITY` line of the login response when the server
    /// sent one, saving a round trip; otherwise re-queries.
    pub async fn reload_from_login_response(&self, lines: &[String]) -> Result<Capabilities> {
        if Capabilities::present_in(lines) {
            self.store_capabilities(lines.to_vec())
        } else {
            self.reload_capabilities().await
        }
    }

    fn store_capabilities(&self, lines: Vec<String>) -> Result<Capabilities> {
        let caps = Capabilities::from_response(&lines);
        if caps.is_empty() {
            self.session.lock().capabilities.clear();
            return Err(Error::InvalidCapabilities(lines));
        }
        tracing::debug!(capabilities = %caps, "capabilities updated");
        self.session.lock().capabilities = caps.clone();
        Ok(caps)
    }

    /// Sends LOGOUT, then tears the session down.
    ///
    /// Teardown happens even if LOGOUT fails; the failure is still returned.
    pub async fn logout(&self) -> Result<()> {
        let result = self.run(&Command::Logout).await;
        self.session.lock().state = ConnectionState::Logout;
        self.teardown().await;
        tracing::info!(host = %self.config.host, "logged out");
        result.map(|_| ())
    }

    /// Like [`logout`](Self::logout), but a no-op when not connected.
    pub async fn disconnect(&self) -> Result<()> {
        self.release_if_lost().await;
        if !self.is_connected() {
            return Ok(());
        }
        self.logout().await
    }

    /// Splits `stream`, installs its write half and starts a read loop on it.
    async fn attach(&self, stream: T::Stream, greeting: Option<oneshot::Sender<String>>) {
        let (read, write) = tokio::io::split(stream);
        self.pending.lock().reset();
        *self.writer.lock().await = Some(write);
        *self.reader.lock().await = Some(ReaderHandle::spawn(
            read,
            Arc::clone(&self.pending),
            greeting,
        ));
    }

    /// Closes the transport and resets every piece of session state.
    async fn teardown(&self) {
        let mut writer = self.writer.lock().await;
        if let Some(mut stream) = writer.take() {
            let _ = stream.shutdown().await;
        }
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        self.drop_session();
    }

    /// Tears down a session whose read loop ended on its own.
    async fn release_if_lost(&self) {
        let lost = self.session.lock().connected && self.pending.lock().is_closed();
        if lost {
            tracing::info!(host = %self.config.host, "connection lost, releasing transport");
            self.teardown().await;
        }
    }

    /// Forgets a transport that can no longer be used.
    fn drop_session(&self) {
        self.pending.lock().reset();
        *self.session.lock() = SessionState::default();
    }

    async fn write_continuation(&self, reply: &str) -> Result<()> {
        reject_line_breaks(reply)?;
        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(Error::NotConnected)?;
        stream.write_all(format!("{reply}\r\n").as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Removes a pending entry when its command is abandoned.
///
/// Covers a failed write, a failing continuation handler, and the caller
/// dropping the `send_command` future.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingTable>,
    tag: Option<Tag>,
}

impl<'a> PendingGuard<'a> {
    const fn new(pending: &'a Mutex<PendingTable>, tag: Tag) -> Self {
        Self {
            pending,
            tag: Some(tag),
        }
    }

    fn disarm(mut self) {
        self.tag = None;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(tag) = self.tag.take()
            && self.pending.lock().remove(&tag)
        {
            tracing::debug!(%tag, "abandoned command removed");
        }
    }
}

/// Fails with `InvalidRequest` if `text` would span more than one line.
fn reject_line_breaks(text: &str) -> Result<()> {
    if text.contains(['\r', '\n']) {
        return Err(Error::InvalidRequest(
            "command text contains CR or LF".to_string(),
        ));
    }
    Ok(())
}

/// Maps a completed command's lines to success or failure.
///
/// The status is the second token of the final (tagged) line.
fn completion_result(lines: Vec<String>) -> Result<Vec<String>> {
    let Some(last) = lines.last() else {
        return Err(Error::InvalidResponse(String::new()));
    };
    match last.split_whitespace().nth(1) {
        Some(status) if status.eq_ignore_ascii_case("BAD") => Err(Error::BadResponse(last.clone())),
        Some(status) if status.eq_ignore_ascii_case("NO") => Err(Error::NoResponse(last.clone())),
        _ => Ok(lines),
    }
}
