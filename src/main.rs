use linegate::command::LogCommands;
use linegate::config::Config;
use linegate::server::Server;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        backlog = config.backlog,
        pool_size = config.pool_size,
        tick_interval_secs = config.tick_interval.as_secs(),
        bans = config.bans.len(),
        features = ?config.features,
        "Starting linegate server"
    );

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(workers) = config.workers.filter(|&w| w > 0) {
        runtime.worker_threads(workers);
    }
    let runtime = runtime.build()?;

    runtime.block_on(async {
        let server = Server::new(config, Arc::new(LogCommands));
        server.run().await
    })?;

    Ok(())
}
