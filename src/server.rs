//! Server lifecycle.
//!
//! Wires the context, listener, tick driver and features together and
//! runs them until shutdown is requested.

use crate::command::CommandHandler;
use crate::config::Config;
use crate::context::Context;
use crate::feature::FeatureSet;
use crate::listener::{Listener, ListenerError};
use crate::tick::TickDriver;
use chrono::{DateTime, Local};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Server instance
pub struct Server {
    config: Config,
    context: Arc<Context>,
    listener: Listener,
    features: FeatureSet,
    activated: DateTime<Local>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config, handler: Arc<dyn CommandHandler>) -> Self {
        let context = Context::new(&config, handler);
        let listener = Listener::new(config.listen, Arc::clone(&context));
        let features = FeatureSet::from_names(config.features.as_slice());

        Server {
            config,
            context,
            listener,
            features,
            activated: Local::now(),
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Run until Ctrl+C.
    pub async fn run(&self) -> Result<(), ListenerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Start everything, wait for `shutdown`, then stop everything.
    ///
    /// Only a failure to bind the listener is returned; features are
    /// stopped again before it is.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), ListenerError>
    where
        F: Future<Output = ()>,
    {
        info!(
            activated = %self.activated.format("%Y-%m-%d %H:%M:%S"),
            features = ?self.features.names(),
            "Starting server"
        );
        self.features.start_all();

        if let Err(e) = self.listener.start(self.config.backlog) {
            self.features.stop_all();
            return Err(e);
        }

        let (tick_shutdown, tick_shutdown_rx) = watch::channel(false);
        let ticker = if self.config.tick_interval.is_zero() {
            None
        } else {
            let driver = TickDriver::new(
                self.config.tick_interval,
                self.config.tick_send_timeout,
                self.config.tick_clear_screen,
                Arc::clone(&self.context),
            );
            Some(tokio::spawn(driver.run(tick_shutdown_rx)))
        };

        shutdown.await;
        info!("Shutting down");

        self.listener.stop().await;

        let _ = tick_shutdown.send(true);
        if let Some(ticker) = ticker {
            if let Err(e) = ticker.await {
                error!(error = %e, "Tick driver terminated abnormally");
            }
        }

        self.features.stop_all();

        let uptime = Local::now() - self.activated;
        info!(
            uptime_secs = uptime.num_seconds(),
            sessions = self.context.sessions.len(),
            "Server stopped"
        );
        Ok(())
    }
}
