//! Tracing setup: human-readable console output plus optional JSON files.

use anyhow::{Context, Result};
use spoa_auth_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Crates whose logs follow the configured level; everything else is `warn`.
const CRATES: [&str; 6] = [
    "spoa_auth",
    "spoa_auth_config",
    "spoa_auth_types",
    "spoa_auth_spop",
    "spoa_auth_oidc",
    "spoa_auth_ldap",
];

/// `EnvFilter` directives for `level`.
pub fn filter_directives(level: &str) -> String {
    let mut directives: Vec<String> = CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

fn filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(filter_directives(level))
        .with_context(|| format!("invalid log level '{}'", level))
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the console filter. The returned guard flushes the
/// file writer and must be held until exit.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter(level)?,
    };

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(filter(level)?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}
