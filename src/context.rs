//! Shared server state.
//!
//! One `Context` is built at startup and handed to the listener and the
//! tick driver. Nothing here is global, so independent servers can run
//! side by side in one process.

use crate::bans::BanList;
use crate::command::CommandHandler;
use crate::config::Config;
use crate::registry::SessionRegistry;
use crate::session::SessionPool;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators shared by every connection.
pub struct Context {
    pub pool: SessionPool,
    pub bans: BanList,
    pub sessions: SessionRegistry,
    pub handler: Arc<dyn CommandHandler>,
    /// How long a new session waits for the client's negotiation reply.
    pub negotiation_timeout: Duration,
}

impl Context {
    pub fn new(config: &Config, handler: Arc<dyn CommandHandler>) -> Arc<Self> {
        Arc::new(Self {
            pool: SessionPool::new(config.pool_size),
            bans: BanList::new(config.bans.iter().cloned()),
            sessions: SessionRegistry::with_capacity(config.pool_size),
            handler,
            negotiation_timeout: config.negotiation_timeout,
        })
    }
}
