//! Client sessions.
//!
//! A [`Session`] owns one connection's line-editing state and drives the
//! telnet-style protocol for it:
//!
//! ```text
//! Idle --attach--> Negotiating --> ReadingLine <--> Dispatching
//!                                       |
//!                                  EOF / control byte / I/O error
//!                                       v
//!                                    Closing --detach--> Idle
//! ```
//!
//! Sessions are allocated once and reused through [`SessionPool`]; only
//! the attachment (connection, address, port) changes between clients.
//! The write side of an attachment is shared through [`SessionHandle`]
//! so the broadcast driver and command handlers can reach the client
//! while the session task owns the read side. A session is visible to
//! broadcasts only between its preamble and its detach.

mod editor;
mod pool;

pub use editor::{Edit, LineEditor, BACKSPACE, CR, INPUT_CAPACITY};
pub use pool::SessionPool;

use crate::command::CommandHandler;
use crate::registry::SessionRegistry;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// IAC WILL ECHO: the server takes over echoing typed bytes.
pub const PREAMBLE: [u8; 3] = [0xFF, 0xFB, 0x01];

/// Prompt written after negotiation and after every dispatched line.
pub const PROMPT: u8 = b'>';

/// Echoed when a line is committed.
pub const CRLF: &[u8] = b"\r\n";

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Pooled, no connection.
    Idle,
    /// Preamble sent, draining the client's reply.
    Negotiating,
    /// Collecting bytes of the next line.
    ReadingLine,
    /// Waiting on the command handler.
    Dispatching,
    /// Releasing the connection.
    Closing,
}

/// Write side of one attachment.
struct Outbound {
    attached: AtomicBool,
    writer: Mutex<Option<BoxedWriter>>,
}

/// Shared handle to an attached session's output path.
///
/// Clones stay valid after the session detaches; sends then become
/// no-ops. A later attachment of the same pooled session gets a fresh
/// handle, so stale clones never reach the next client.
#[derive(Clone)]
pub struct SessionHandle {
    address: Arc<str>,
    port: u16,
    outbound: Arc<Outbound>,
}

impl SessionHandle {
    /// Create a handle writing to `writer`.
    pub fn new<W>(address: &str, port: u16, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        Self {
            address: Arc::from(address),
            port,
            outbound: Arc::new(Outbound {
                attached: AtomicBool::new(true),
                writer: Mutex::new(Some(writer)),
            }),
        }
    }

    /// Remote address of the client.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Remote port of the client.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the underlying connection is still open.
    pub fn is_attached(&self) -> bool {
        self.outbound.attached.load(Ordering::Acquire)
    }

    /// Write `data` to the client.
    ///
    /// Independent of line editing: output may interleave with the
    /// client's in-progress input. A no-op once the session has detached.
    ///
    /// Waits for earlier sends to finish; a client that stops reading
    /// stalls this indefinitely, so callers that must not block bound it
    /// with a timeout.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = self.outbound.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Ok(());
        };
        if !self.is_attached() {
            return Ok(());
        }
        writer.write_all(data).await?;
        writer.flush().await
    }

    /// Mark the handle detached, then shut down and release the write
    /// side if no send is in flight. Idempotent and never waits on a
    /// stalled send.
    async fn close(&self) -> io::Result<()> {
        self.outbound.attached.store(false, Ordering::Release);
        let writer = match self.outbound.writer.try_lock() {
            Ok(mut writer) => writer.take(),
            Err(_) => {
                // The writer is dropped with the last handle clone
                debug!(
                    address = %self.address,
                    port = self.port,
                    "Send in flight, leaving writer to its owner"
                );
                return Ok(());
            }
        };
        match writer {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// A live connection bound to a session.
struct Attachment {
    handle: SessionHandle,
    reader: BoxedReader,
}

/// One client's connection state and line-editing buffer.
pub struct Session {
    editor: LineEditor,
    state: SessionState,
    attachment: Option<Attachment>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            editor: LineEditor::new(),
            state: SessionState::Idle,
            attachment: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    pub fn address(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.handle.address())
    }

    pub fn port(&self) -> Option<u16> {
        self.attachment.as_ref().map(|a| a.handle.port())
    }

    /// Bytes in the line currently being typed.
    pub fn cursor(&self) -> usize {
        self.editor.cursor()
    }

    /// Bind the session to a connection.
    ///
    /// The session takes exclusive ownership of `stream` until
    /// [`detach`](Self::detach).
    pub fn attach<S>(&mut self, address: &str, port: u16, stream: S) -> SessionHandle
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        debug_assert!(self.attachment.is_none(), "session attached twice");

        let (reader, writer) = tokio::io::split(stream);
        let handle = SessionHandle::new(address, port, writer);
        self.attachment = Some(Attachment {
            handle: handle.clone(),
            reader: Box::new(reader),
        });
        self.state = SessionState::Negotiating;

        info!(address, port, "Session attached");
        handle
    }

    /// Negotiate, then edit and dispatch lines until the client goes away.
    ///
    /// The session joins `sessions` once the preamble has been written and
    /// leaves it when serving ends. The attachment is always released
    /// before this returns, whatever ended the session. Transport errors
    /// are returned for logging only.
    pub async fn run(
        &mut self,
        handler: &dyn CommandHandler,
        negotiation_timeout: Duration,
        sessions: &SessionRegistry,
    ) -> io::Result<()> {
        let result = self.serve(handler, negotiation_timeout, sessions).await;
        self.detach().await;
        result
    }

    async fn serve(
        &mut self,
        handler: &dyn CommandHandler,
        negotiation_timeout: Duration,
        sessions: &SessionRegistry,
    ) -> io::Result<()> {
        let Some(attachment) = self.attachment.as_mut() else {
            return Ok(());
        };
        let handle = attachment.handle.clone();
        let reader = &mut attachment.reader;
        let editor = &mut self.editor;
        let state = &mut self.state;

        *state = SessionState::Negotiating;
        handle.send(&PREAMBLE).await?;
        // The preamble must be the first thing on the wire
        let _registration = sessions.register(handle.clone());
        drain_negotiation_reply(reader, negotiation_timeout).await;
        handle.send(&[PROMPT]).await?;
        *state = SessionState::ReadingLine;

        let mut chunk = [0u8; INPUT_CAPACITY];
        let mut echo = BytesMut::with_capacity(INPUT_CAPACITY);

        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                trace!("Connection closed by client");
                return Ok(());
            }

            for &byte in &chunk[..n] {
                match editor.feed(byte) {
                    Edit::Echo(b) => echo.put_u8(b),
                    Edit::Erase => echo.put_u8(BACKSPACE),
                    Edit::Ignore => {}
                    Edit::Disconnect => {
                        debug!(byte, "Control byte received, closing session");
                        return Ok(());
                    }
                    Edit::Commit(line) => {
                        echo.extend_from_slice(CRLF);
                        handle.send(&echo.split()).await?;

                        *state = SessionState::Dispatching;
                        trace!(command = %line, "Dispatching");
                        handler.handle(&handle, &line).await;

                        handle.send(&[PROMPT]).await?;
                        *state = SessionState::ReadingLine;
                    }
                }
            }

            if !echo.is_empty() {
                handle.send(&echo.split()).await?;
            }
        }
    }

    /// Release the connection and clear all per-client state.
    ///
    /// Safe to call more than once; only the first call after an attach
    /// does anything.
    pub async fn detach(&mut self) {
        let Some(attachment) = self.attachment.take() else {
            return;
        };
        self.state = SessionState::Closing;

        if let Err(e) = attachment.handle.close().await {
            debug!(error = %e, "Error closing connection");
        }
        drop(attachment.reader);
        self.editor.reset();
        self.state = SessionState::Idle;

        info!(
            address = %attachment.handle.address(),
            port = attachment.handle.port(),
            "Session detached"
        );
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Discard the client's reply to the preamble.
///
/// The reply is advisory: a slow, missing or failed reply does not end
/// the session.
async fn drain_negotiation_reply(reader: &mut BoxedReader, wait: Duration) {
    let mut reply = [0u8; INPUT_CAPACITY];
    match tokio::time::timeout(wait, reader.read(&mut reply)).await {
        Ok(Ok(n)) => trace!(bytes = n, "Negotiation reply drained"),
        Ok(Err(e)) => debug!(error = %e, "Negotiation read failed"),
        Err(_) => trace!("No negotiation reply"),
    }
}
