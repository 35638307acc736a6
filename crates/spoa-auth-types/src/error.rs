//! Error types for authenticators and the router.

use thiserror::Error;

/// Failure raised by an authenticator.
///
/// Rejected credentials are not errors: they are reported as a `deny` or
/// `redirect` verdict. This type is for conditions where no verdict about the
/// credentials could be reached at all.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The directory or identity provider could not be consulted.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// The upstream call did not finish before its deadline.
    #[error("upstream timed out after {0} ms")]
    Timeout(u64),

    /// The proxy sent a message the authenticator cannot evaluate.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unexpected local failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable reason string reported to the proxy in the `error_reason` variable.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Upstream(_) => "upstream_unavailable",
            AuthError::Timeout(_) => "upstream_timeout",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Whether this failure belongs to the upstream-failure class.
    pub fn is_upstream(&self) -> bool {
        matches!(self, AuthError::Upstream(_) | AuthError::Timeout(_))
    }
}

/// Errors raised by [`crate::AuthenticatorRouter`] and its builder.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Two authenticators were registered under the same action name.
    #[error("action '{0}' is already registered")]
    DuplicateAction(String),

    /// A message named an action that has no authenticator.
    #[error("no authenticator registered for action '{0}'")]
    UnknownAction(String),

    /// The authenticator itself failed.
    #[error("authenticator for action '{action}' failed: {source}")]
    Authenticator {
        action: String,
        #[source]
        source: AuthError,
    },
}
