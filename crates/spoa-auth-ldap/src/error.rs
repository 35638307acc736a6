//! Error types for the LDAP authenticator.

use spoa_auth_types::AuthError;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, LdapError>;

/// Failures that prevented the directory from answering.
///
/// Rejected credentials are not errors; see [`crate::BindOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum LdapError {
    #[error("cannot connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("{operation} timed out after {ms} ms")]
    Timeout { operation: &'static str, ms: u64 },

    /// The server answered with an operational error.
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl From<LdapError> for AuthError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::Timeout { ms, .. } => AuthError::Timeout(ms),
            LdapError::Config(msg) => AuthError::Internal(msg),
            other => AuthError::Upstream(other.to_string()),
        }
    }
}
