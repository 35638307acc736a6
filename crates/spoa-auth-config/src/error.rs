//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to parse YAML.
    #[error("failed to parse YAML config: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    /// No config file given and none found in the default locations.
    #[error("no config file found (searched: {searched})")]
    NotFound { searched: String },

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// A field is present but unusable.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// A secret names an environment variable that is not set.
    #[error("environment variable '{var}' for {field} is not set")]
    SecretEnvMissing { var: String, field: String },

    /// An action is bound to an authenticator without a config section.
    #[error("action '{action}' uses the {kind} authenticator, but no [{kind}] section is configured")]
    UnconfiguredAuthenticator { action: String, kind: String },

    /// No action is bound to any authenticator.
    #[error("no actions configured")]
    NoActions,
}
