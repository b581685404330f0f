//! Periodic broadcast to every attached session.
//!
//! Each tick fans a status line out to all live sessions at once. A
//! failing or slow client only affects its own delivery: sends run as
//! separate tasks, each bounded by a timeout, and the ticker never waits
//! on them.

use crate::context::Context;
use crate::session::SessionHandle;
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Erase display and home the cursor.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Broadcast timer.
pub struct TickDriver {
    interval: Duration,
    send_timeout: Duration,
    clear_screen: bool,
    context: Arc<Context>,
}

impl TickDriver {
    /// A zero `interval` yields a driver that never ticks.
    pub fn new(
        interval: Duration,
        send_timeout: Duration,
        clear_screen: bool,
        context: Arc<Context>,
    ) -> Self {
        Self {
            interval,
            send_timeout,
            clear_screen,
            context,
        }
    }

    /// Tick until `shutdown` fires. The first tick comes one interval
    /// after start. Returns at once if the interval is zero.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.interval.is_zero() {
            debug!("Tick interval is zero, broadcast disabled");
            return;
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                _ = ticker.tick() => {
                    tick += 1;
                    let sessions = self.context.sessions.snapshot();
                    debug!(tick, sessions = sessions.len(), "Tick");
                    tokio::spawn(broadcast(
                        sessions,
                        status_message(tick, self.clear_screen),
                        self.send_timeout,
                    ));
                }
            }
        }
    }

    /// Deliver tick number `tick` and wait for every send to finish.
    ///
    /// Returns the number of sessions that received it.
    pub async fn tick(&self, tick: u64) -> usize {
        let sessions = self.context.sessions.snapshot();
        broadcast(
            sessions,
            status_message(tick, self.clear_screen),
            self.send_timeout,
        )
        .await
    }
}

/// Status line for one tick.
pub fn status_message(tick: u64, clear_screen: bool) -> Bytes {
    let clear = if clear_screen { CLEAR_SCREEN } else { "" };
    Bytes::from(format!("{clear}\r\nTick {tick}\r\n"))
}

/// Send `message` to all `sessions` concurrently.
///
/// A send still pending after `send_timeout` is abandoned. Failures and
/// timeouts are logged per session. Returns the number of successful
/// deliveries.
pub async fn broadcast(
    sessions: Vec<SessionHandle>,
    message: Bytes,
    send_timeout: Duration,
) -> usize {
    let mut sends = JoinSet::new();
    for handle in sessions {
        let message = message.clone();
        sends.spawn(async move {
            let result = match tokio::time::timeout(send_timeout, handle.send(&message)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "send timed out")),
            };
            (handle, result)
        });
    }

    let mut delivered = 0;
    while let Some(joined) = sends.join_next().await {
        match joined {
            Ok((_, Ok(()))) => delivered += 1,
            Ok((handle, Err(e))) => {
                warn!(
                    address = %handle.address(),
                    port = handle.port(),
                    error = %e,
                    "Broadcast send failed"
                );
            }
            Err(e) => error!(error = %e, "Broadcast task failed"),
        }
    }
    delivered
}
