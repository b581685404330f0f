//! Configuration module for the linegate server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the session server
#[derive(Parser, Debug)]
#[command(name = "linegate")]
#[command(author = "linegate authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented telnet-style session server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:23)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Accept backlog (values below 1 are treated as 1)
    #[arg(short = 'b', long, allow_negative_numbers = true)]
    pub backlog: Option<i32>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Number of pre-allocated sessions
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Seconds between broadcast ticks (0 disables ticking)
    #[arg(long)]
    pub tick_interval: Option<u64>,

    /// Remote address to reject at accept time (repeatable)
    #[arg(long = "ban")]
    pub bans: Vec<String>,

    /// Feature to enable (repeatable)
    #[arg(long = "feature")]
    pub features: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub bans: BanConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Accept backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            workers: None,
        }
    }
}

/// Session-related configuration
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Number of sessions allocated up front
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// How long to wait for the client's negotiation reply, in milliseconds
    #[serde(default = "default_negotiation_timeout_ms")]
    pub negotiation_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            negotiation_timeout_ms: default_negotiation_timeout_ms(),
        }
    }
}

/// Broadcast tick configuration
#[derive(Debug, Deserialize)]
pub struct TickConfig {
    /// Seconds between ticks
    #[serde(default = "default_tick_interval")]
    pub interval: u64,
    /// Prefix each status line with a terminal clear-screen escape
    #[serde(default)]
    pub clear_screen: bool,
    /// How long one session's delivery may take before it is abandoned, in milliseconds
    #[serde(default = "default_tick_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: default_tick_interval(),
            clear_screen: false,
            send_timeout_ms: default_tick_send_timeout_ms(),
        }
    }
}

/// Denied remote addresses
#[derive(Debug, Deserialize, Default)]
pub struct BanConfig {
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Features enabled at startup
#[derive(Debug, Deserialize, Default)]
pub struct FeatureConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:23".to_string()
}

fn default_backlog() -> i32 {
    1
}

fn default_pool_size() -> usize {
    255
}

fn default_negotiation_timeout_ms() -> u64 {
    250
}

fn default_tick_interval() -> u64 {
    6
}

fn default_tick_send_timeout_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub backlog: i32,
    pub workers: Option<usize>,
    pub pool_size: usize,
    pub negotiation_timeout: Duration,
    pub tick_interval: Duration,
    pub tick_clear_screen: bool,
    pub tick_send_timeout: Duration,
    pub bans: Vec<String>,
    pub features: Vec<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli.listen.unwrap_or(toml_config.server.listen);
        let listen = listen
            .parse()
            .map_err(|e| ConfigError::InvalidListen(listen.clone(), e))?;

        // Repeatable CLI lists extend the file's lists rather than replacing them
        let mut bans = toml_config.bans.addresses;
        bans.extend(cli.bans);
        let mut features = toml_config.features.enabled;
        features.extend(cli.features);

        Ok(Config {
            listen,
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            workers: cli.workers.or(toml_config.server.workers),
            pool_size: cli.pool_size.unwrap_or(toml_config.session.pool_size),
            negotiation_timeout: Duration::from_millis(
                toml_config.session.negotiation_timeout_ms,
            ),
            tick_interval: Duration::from_secs(
                cli.tick_interval.unwrap_or(toml_config.tick.interval),
            ),
            tick_clear_screen: toml_config.tick.clear_screen,
            tick_send_timeout: Duration::from_millis(toml_config.tick.send_timeout_ms),
            bans,
            features,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration for in-process tests: ephemeral port, small pool, no ticking.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        listen: "127.0.0.1:0".parse().unwrap(),
        backlog: 1,
        workers: None,
        pool_size: 4,
        negotiation_timeout: Duration::from_millis(200),
        tick_interval: Duration::ZERO,
        tick_clear_screen: false,
        tick_send_timeout: Duration::from_millis(500),
        bans: Vec::new(),
        features: Vec::new(),
        log_level: "info".to_string(),
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidListen(String, std::net::AddrParseError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidListen(addr, e) => {
                write!(f, "Invalid listen address '{addr}': {e}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
