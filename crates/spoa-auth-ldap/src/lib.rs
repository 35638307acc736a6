//! LDAP bind authenticator for spoa-auth.
//!
//! A check binds as a service account, searches for the user under the base
//! DN, then binds as the user with the supplied password. A wrong password
//! or unknown user is a `deny` verdict; an unreachable or failing directory
//! is an upstream failure.

pub mod authenticator;
pub mod config;
pub mod directory;
pub mod error;

pub use authenticator::{LdapAuthenticator, args};
pub use config::LdapConfig;
pub use directory::{BindOutcome, Directory, LdapDirectory};
pub use error::{LdapError, Result};
