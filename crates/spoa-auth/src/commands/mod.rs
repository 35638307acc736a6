//! CLI command handlers.

pub mod check_config;
pub mod serve;

use std::net::SocketAddr;
use std::path::PathBuf;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, if any.
    pub config_path: Option<PathBuf>,
    /// Overrides `server.addr`.
    pub listen: Option<SocketAddr>,
    pub verbose: bool,
}
