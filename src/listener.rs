//! TCP listener and accept loop.
//!
//! The accept loop runs as its own task and hands every accepted
//! connection to a separate task, so endpoint resolution, the ban check
//! and the whole session lifetime never hold up the next `accept()`.

use crate::context::Context;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Pause after the first of a run of failed accepts.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Longest pause between failed accepts.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// A bound socket and its accept loop.
struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Listening socket that feeds connections into sessions.
pub struct Listener {
    addr: SocketAddr,
    context: Arc<Context>,
    running: Mutex<Option<Running>>,
}

impl Listener {
    pub fn new(addr: SocketAddr, context: Arc<Context>) -> Self {
        Self {
            addr,
            context,
            running: Mutex::new(None),
        }
    }

    /// Bind and start accepting connections.
    ///
    /// A `backlog` below 1 is treated as 1. Does nothing if already
    /// active. Must be called from within a tokio runtime.
    pub fn start(&self, backlog: i32) -> Result<(), ListenerError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Ok(());
        }

        let backlog = backlog.max(1);
        let listener = bind(self.addr, backlog).map_err(|e| {
            error!(address = %self.addr, error = %e, "Failed to bind listener");
            ListenerError::Bind(self.addr, e)
        })?;
        let local_addr = listener.local_addr().unwrap_or(self.addr);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.context),
            shutdown_rx,
        ));

        info!(address = %local_addr, backlog, "Started listening");
        *running = Some(Running {
            local_addr,
            shutdown,
            task,
        });
        Ok(())
    }

    /// Close the listening socket. Does nothing if not active.
    ///
    /// Sessions already attached keep running until their clients leave.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            error!(error = %e, "Accept loop terminated abnormally");
        }

        info!(address = %running.local_addr, "Stopped listening");
    }

    /// True while the socket is bound and the accept loop is running.
    pub fn is_active(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Address actually bound, which differs from the configured one
    /// when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.local_addr)
    }
}

/// Create the listening socket with an explicit backlog.
fn bind(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<Context>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    failures = 0;
                    tokio::spawn(handle_connection(stream, Arc::clone(&context)));
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let pause = accept_backoff(failures);
                    error!(
                        error = %e,
                        retry_in_ms = pause.as_millis() as u64,
                        "Failed to accept connection"
                    );
                    tokio::select! {
                        biased;

                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
            },
        }
    }
    // Dropping `listener` closes the socket
}

/// Delay before the next accept after `failures` consecutive errors.
fn accept_backoff(failures: u32) -> Duration {
    let doublings = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF
        .saturating_mul(1 << doublings)
        .min(ACCEPT_BACKOFF_MAX)
}

/// Resolve, screen and serve one accepted connection.
async fn handle_connection(stream: TcpStream, context: Arc<Context>) {
    let (address, port) = match stream.peer_addr() {
        Ok(peer) => endpoint(peer),
        Err(e) => {
            debug!(error = %e, "Could not resolve remote endpoint, closing");
            return;
        }
    };

    if context.bans.is_banned(&address) {
        debug!(address = %address, port, "Rejected banned address");
        return;
    }

    let mut session = context.pool.acquire();
    session.attach(&address, port, stream);

    if let Err(e) = session
        .run(
            context.handler.as_ref(),
            context.negotiation_timeout,
            &context.sessions,
        )
        .await
    {
        debug!(address = %address, port, error = %e, "Session ended with error");
    }

    context.pool.release(session);
}

/// Textual address and port of a peer, with IPv4-mapped IPv6 shown as IPv4.
fn endpoint(peer: SocketAddr) -> (String, u16) {
    (peer.ip().to_canonical().to_string(), peer.port())
}

/// Listener errors
#[derive(Debug)]
pub enum ListenerError {
    Bind(SocketAddr, io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(addr, e) => write!(f, "Failed to bind {addr}: {e}"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(_, e) => Some(e),
        }
    }
}
