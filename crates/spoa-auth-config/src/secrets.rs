//! Secret resolution.
//!
//! A secret field `foo` may be given inline as `foo = "..."` or indirectly as
//! `foo_env = "VAR"`. The environment variable wins when both are set.

use crate::error::{ConfigError, Result};

/// A resolved secret with provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    pub source: SecretSource,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    EnvVar(String),
    /// Plaintext in the config file.
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve `field` from its `*_env` indirection or inline value.
pub fn resolve_secret(
    field: &str,
    inline: Option<&str>,
    env_var: Option<&str>,
) -> Result<ResolvedSecret> {
    if let Some(var) = env_var.filter(|v| !v.is_empty()) {
        return match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(ResolvedSecret {
                value,
                source: SecretSource::EnvVar(var.to_string()),
            }),
            _ => Err(ConfigError::SecretEnvMissing {
                var: var.to_string(),
                field: field.to_string(),
            }),
        };
    }

    match inline.filter(|v| !v.is_empty()) {
        Some(value) => Ok(ResolvedSecret {
            value: value.to_string(),
            source: SecretSource::ConfigFile,
        }),
        None => Err(ConfigError::MissingField {
            field: field.to_string(),
            context: "secrets (set it inline or via the matching *_env variable)".to_string(),
        }),
    }
}
