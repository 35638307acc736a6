//! OpenID Connect authenticator for spoa-auth.
//!
//! Gates browser sessions behind an encrypted and signed cookie:
//!
//! - Requests without a valid session are redirected to the provider with a
//!   sealed, browser-bound `state`.
//! - The [`CallbackServer`] redeems the returned code, verifies the ID token
//!   against the provider's signing keys and sets the session cookie.
//! - Later requests are allowed from the cookie alone; no session is stored
//!   on the agent.
//!
//! ```rust,ignore
//! use spoa_auth_oidc::{OidcConfig, OidcEngine, RenewalPolicy};
//!
//! let config = OidcConfig::new(issuer, client_id, client_secret, redirect_url, RenewalPolicy::Disabled)
//!     .with_secrets(signature_secret, encryption_secret);
//! let engine = std::sync::Arc::new(OidcEngine::new(config).await?);
//! ```

pub mod callback;
pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod provider;
pub mod seal;
pub mod session;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use callback::{CallbackError, CallbackServer};
pub use config::{CookieConfig, OidcConfig, RenewalPolicy};
pub use cookie::SetCookie;
pub use engine::{CallbackOutcome, LoginRedirect, OidcEngine, args};
pub use error::{CookieError, OidcError, Result};
pub use provider::{Provider, ProviderMetadata, TokenResponse};
pub use seal::Sealer;
pub use session::SessionClaims;
pub use state::StateClaims;
