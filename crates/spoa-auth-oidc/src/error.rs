//! Error types for the OIDC authenticator.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OidcError>;

/// Errors raised by discovery, the callback flow and the token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    /// Provider metadata could not be fetched or parsed.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The callback's state is unsealable, expired or bound to another browser.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The token endpoint was unreachable or refused the grant.
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The ID token is malformed or its claims do not match.
    #[error("Invalid ID token: {0}")]
    InvalidIdToken(String),

    /// The provider redirected back with an error instead of a code.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Config error: {0}")]
    Config(String),

    /// A sealed value could not be produced.
    #[error("Cookie error: {0}")]
    Cookie(#[from] CookieError),
}

/// Why a sealed cookie or state token was rejected.
///
/// Only ever reported to clients as "invalid"; the variants exist for logs
/// and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    /// The MAC does not match, or the token is not even shaped like one.
    #[error("invalid signature")]
    InvalidSignature,

    /// Authentic but undecryptable or unparsable.
    #[error("invalid cookie")]
    Invalid,

    #[error("cookie expired")]
    Expired,
}
