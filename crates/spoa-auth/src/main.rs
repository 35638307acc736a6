//! spoa-auth - HAProxy SPOE authentication agent
//!
//! Main entry point for the spoa-auth CLI.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{check_config, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// spoa-auth - authentication agent for HAProxy's stream processing offload engine
#[derive(Parser)]
#[command(name = "spoa-auth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file (TOML or YAML)
    #[arg(short, long, global = true, env = "SPOA_AUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Agent listen address (overrides server.addr)
    #[arg(short, long, global = true)]
    pub listen: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the agent (default)
    Serve(serve::ServeArgs),

    /// Validate the configuration and exit
    CheckConfig(check_config::CheckConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = commands::Context {
        config_path: cli.config,
        listen: cli.listen,
        verbose: cli.verbose,
    };

    match cli.command.unwrap_or(Commands::Serve(serve::ServeArgs::default())) {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::CheckConfig(args) => check_config::run(args, &ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "spoa-auth",
            "--config",
            "/etc/spoa-auth.toml",
            "--verbose",
            "--listen",
            "0.0.0.0:12345",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/spoa-auth.toml")));
        assert!(cli.verbose);
        assert_eq!(cli.listen.unwrap().port(), 12345);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_check_config() {
        let cli = Cli::parse_from(["spoa-auth", "check-config", "-c", "agent.yaml"]);
        assert!(matches!(cli.command, Some(Commands::CheckConfig(_))));
        assert_eq!(cli.config, Some(PathBuf::from("agent.yaml")));
    }
}
