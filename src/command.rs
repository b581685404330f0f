//! Command handler contract.
//!
//! A session hands every committed line to the host's handler. What a
//! line means is up to the handler; the session only guarantees that
//! lines from one client arrive in order and never concurrently.

use crate::session::SessionHandle;
use async_trait::async_trait;
use tracing::info;

/// Receives committed lines from sessions.
///
/// The session awaits `handle` before reading further input, so a slow
/// handler delays only its own client. Long work should be spawned.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, session: &SessionHandle, line: &str);
}

/// Handler installed by the binary: logs each command.
pub struct LogCommands;

#[async_trait]
impl CommandHandler for LogCommands {
    async fn handle(&self, session: &SessionHandle, line: &str) {
        info!(
            address = %session.address(),
            port = session.port(),
            command = line,
            "Command received"
        );
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every dispatched line, optionally replying to the client.
    #[derive(Default)]
    pub struct Recorder {
        pub lines: Mutex<Vec<String>>,
        pub reply: Option<&'static [u8]>,
    }

    impl Recorder {
        pub fn replying(reply: &'static [u8]) -> Self {
            Self {
                lines: Mutex::new(Vec::new()),
                reply: Some(reply),
            }
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandHandler for Recorder {
        async fn handle(&self, session: &SessionHandle, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
            if let Some(reply) = self.reply {
                session.send(reply).await.unwrap();
            }
        }
    }
}
