//! linegate: a line-oriented telnet-style session server
//!
//! Accepts raw TCP connections, negotiates server-side echo and turns
//! each client's keystrokes into complete command lines.
//!
//! Features:
//! - Pooled sessions reused across connections
//! - Byte-level line editing with backspace and overflow handling
//! - Ban list checked before any session work
//! - Periodic status broadcast to every connected client
//! - Named features started and stopped around the listener
//! - Configuration via CLI arguments or TOML file

pub mod bans;
pub mod command;
pub mod config;
pub mod context;
pub mod feature;
pub mod listener;
pub mod registry;
pub mod server;
pub mod session;
pub mod tick;
