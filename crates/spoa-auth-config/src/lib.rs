//! Configuration for the spoa-auth agent.
//!
//! TOML (default) or YAML files with the sections:
//! - `[server]` agent listener and protocol limits
//! - `[logging]` log level and optional JSON log directory
//! - `[oidc]` OpenID Connect authenticator
//! - `[ldap]` LDAP authenticator
//! - `[actions]` action name → `"oidc"` / `"ldap"`
//!
//! Secrets are resolved through `*_env` indirection or inline values.

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, default_search_paths, discover, load_config, load_config_file,
    user_config_dir,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_secret};
pub use types::*;
