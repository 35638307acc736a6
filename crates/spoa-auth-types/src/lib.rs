//! Shared types for the spoa-auth agent.
//!
//! The protocol engine, the authenticators and the binary all speak in terms
//! of the types defined here:
//!
//! - [`value`] - typed values carried in offload-protocol messages
//! - [`verdict`] - the allow/deny/redirect outcome plus its output variables
//! - [`authenticator`] - the capability interface every authenticator implements
//! - [`router`] - the immutable action-name → authenticator mapping

pub mod authenticator;
pub mod error;
pub mod router;
pub mod value;
pub mod verdict;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use authenticator::{Attributes, Authenticator, SharedAuthenticator};
pub use error::{AuthError, RouterError};
pub use router::{AuthenticatorRouter, RouterBuilder};
pub use value::TypedData;
pub use verdict::{Decision, Variable, Verdict, vars};
