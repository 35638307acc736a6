//! Config file discovery and loading.
//!
//! An explicit path (`--config` / `SPOA_AUTH_CONFIG`) is used as is.
//! Otherwise the first existing file wins, in order:
//! 1. `./spoa-auth.toml`, `./spoa-auth.yaml`, `./spoa-auth.yml`, `./config.yaml`
//! 2. `~/.config/spoa-auth/config.toml` (platform config dir)

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::secrets::SecretSource;
use crate::types::SpoaAuthConfig;

/// Application name for config directory resolution.
const APP_NAME: &str = "spoa-auth";

/// Config filenames searched in the working directory.
const LOCAL_CONFIG_FILES: [&str; 4] = [
    "spoa-auth.toml",
    "spoa-auth.yaml",
    "spoa-auth.yml",
    "config.yaml",
];

/// Config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SpoaAuthConfig,
    pub source: PathBuf,
    /// Non-fatal findings, such as plaintext secrets.
    pub warnings: Vec<String>,
}

/// Load from `explicit`, or discover a config file in the default locations.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    match explicit {
        Some(path) => load_from(path),
        None => discover(&default_search_paths()),
    }
}

/// Default candidate paths, in order of preference.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = LOCAL_CONFIG_FILES.iter().map(PathBuf::from).collect();
    if let Some(dir) = user_config_dir() {
        paths.push(dir.join(USER_CONFIG_FILE));
    }
    paths
}

/// Platform config directory for spoa-auth.
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Load the first existing file among `candidates`.
pub fn discover(candidates: &[PathBuf]) -> Result<LoadedConfig> {
    match candidates.iter().find(|p| p.is_file()) {
        Some(path) => load_from(path),
        None => Err(ConfigError::NotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

fn load_from(path: &Path) -> Result<LoadedConfig> {
    let config = load_config_file(path)?;
    let mut warnings = plaintext_secret_warnings(&config);
    if config.server.log_level.is_some() {
        warnings.push("server.log_level is deprecated; set log_level under [logging]".to_string());
    }
    Ok(LoadedConfig {
        config,
        source: path.to_path_buf(),
        warnings,
    })
}

/// Parse one file; `.yaml`/`.yml` as YAML, anything else as TOML.
pub fn load_config_file(path: &Path) -> Result<SpoaAuthConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => SpoaAuthConfig::from_yaml(&contents),
        _ => SpoaAuthConfig::from_toml(&contents),
    }
}

fn plaintext_secret_warnings(config: &SpoaAuthConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut check = |field: &str, secret: crate::Result<crate::ResolvedSecret>| {
        if let Ok(secret) = secret
            && secret.source == SecretSource::ConfigFile
        {
            warnings.push(format!(
                "{} is stored in plaintext; prefer {}_env",
                field, field
            ));
        }
    };
    if let Some(oidc) = &config.oidc {
        check("oidc.client_secret", oidc.client_secret());
        check("oidc.signature_secret", oidc.signature_secret());
        check("oidc.encryption_secret", oidc.encryption_secret());
    }
    if let Some(ldap) = &config.ldap {
        check("ldap.password", ldap.password());
    }
    warnings
}
