//! Background read loop.
//!
//! One task per attached stream is the only reader of the transport, the only
//! writer into the [`LineReassembler`], and the only caller of
//! [`PendingTable::handle_line`]. It runs until the server closes the
//! connection, a read fails, or the owner asks it to stop; in the last case it
//! hands the read half back so the stream can be reassembled (STARTTLS).

use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, ReadHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::framed::{DEFAULT_BUFFER_SIZE, LineReassembler};
use super::router::PendingTable;
use crate::{Error, Result};

/// Owner's handle on a running read loop.
#[derive(Debug)]
pub struct ReaderHandle<S> {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Option<ReadHalf<S>>>,
}

impl<S> ReaderHandle<S>
where
    S: AsyncRead + Send + 'static,
{
    /// Spawns a read loop over `reader`.
    ///
    /// If `greeting` is given, the first complete line is sent there instead
    /// of being routed.
    pub fn spawn(
        reader: ReadHalf<S>,
        pending: Arc<Mutex<PendingTable>>,
        greeting: Option<oneshot::Sender<String>>,
    ) -> Self {
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(read_loop(reader, pending, stop_rx, greeting));
        Self { stop, task }
    }

    /// Stops the loop and returns the read half.
    ///
    /// Once this returns, no further bytes from the old stream are routed.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the loop had already ended on its own.
    pub async fn stop(self) -> Result<ReadHalf<S>> {
        let _ = self.stop.send(());
        match self.task.await {
            Ok(Some(reader)) => Ok(reader),
            Ok(None) => Err(Error::ConnectionClosed),
            Err(e) => {
                tracing::warn!(?e, "read loop panicked");
                Err(Error::ConnectionClosed)
            }
        }
    }

    /// Stops the loop without waiting for it.
    pub fn abort(self) {
        let _ = self.stop.send(());
        self.task.abort();
    }
}

async fn read_loop<S>(
    mut reader: ReadHalf<S>,
    pending: Arc<Mutex<PendingTable>>,
    mut stop: oneshot::Receiver<()>,
    mut greeting: Option<oneshot::Sender<String>>,
) -> Option<ReadHalf<S>>
where
    S: AsyncRead,
{
    let mut lines = LineReassembler::new();
    let mut buf = BytesMut::with_capacity(DEFAULT_BUFFER_SIZE);

    loop {
        buf.clear();
        tokio::select! {
            biased;
            _ = &mut stop => {
                if lines.buffered() > 0 {
                    tracing::warn!(bytes = lines.buffered(), "discarding unread bytes from detached stream");
                }
                return Some(reader);
            }
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!("connection closed by server");
                    break;
                }
                Ok(_) => {
                    if let Err(e) = lines.push(&buf) {
                        tracing::warn!(%e, "closing connection");
                        break;
                    }
                    for line in lines.lines() {
                        tracing::trace!(line = %line, "S:");
                        if let Some(tx) = greeting.take() {
                            let _ = tx.send(line);
                            continue;
                        }
                        pending.lock().handle_line(&line);
                    }
                }
                Err(e) => {
                    tracing::warn!(?e, "read failed");
                    break;
                }
            },
        }
    }

    pending.lock().close();
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncWriteExt, duplex};
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_greeting_then_routing() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .read(b"* 1 EXISTS\r\n0001 OK do")
            .read(b"ne\r\n")
            .build();
        let (read, _write) = tokio::io::split(mock);
        let pending = Arc::new(Mutex::new(PendingTable::new()));
        let registration = pending.lock().register(false).unwrap();
        let (greeting_tx, greeting_rx) = oneshot::channel();

        let handle = ReaderHandle::spawn(read, pending.clone(), Some(greeting_tx));

        assert_eq!(greeting_rx.await.unwrap(), "* OK ready");
        assert_eq!(
            registration.completion.await.unwrap(),
            vec!["* 1 EXISTS", "0001 OK done"]
        );
        // The mock is exhausted, so the loop sees EOF and closes the table.
        assert!(handle.task.await.unwrap().is_none());
        assert!(matches!(
            pending.lock().register(false),
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_stop_returns_read_half() {
        let (client, mut server) = duplex(64);
        let (read, write) = tokio::io::split(client);
        let pending = Arc::new(Mutex::new(PendingTable::new()));
        let registration = pending.lock().register(false).unwrap();

        let handle = ReaderHandle::spawn(read, pending.clone(), None);
        server.write_all(b"0001 OK begin TLS\r\n").await.unwrap();
        registration.completion.await.unwrap();

        let read = handle.stop().await.unwrap();
        let _stream = read.unsplit(write);
        assert!(pending.lock().register(false).is_ok());
    }

    #[tokio::test]
    async fn test_eof_fails_outstanding_commands() {
        let (client, server) = duplex(64);
        let (read, _write) = tokio::io::split(client);
        let pending = Arc::new(Mutex::new(PendingTable::new()));
        let registration = pending.lock().register(false).unwrap();

        let _handle = ReaderHandle::spawn(read, pending, None);
        drop(server);

        assert!(registration.completion.await.is_err());
    }
}
