//! The LDAP [`Authenticator`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use spoa_auth_types::{Attributes, AuthError, Authenticator, Verdict};

use crate::directory::{BindOutcome, Directory};

/// Message arguments read by the LDAP authenticator.
pub mod args {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    /// `Authorization` request header; used when `username` is absent.
    pub const AUTHORIZATION: &str = "authorization";
}

/// Checks a username and password against a [`Directory`].
#[derive(Debug, Clone)]
pub struct LdapAuthenticator {
    directory: Arc<dyn Directory>,
}

impl LdapAuthenticator {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }
}

/// Credentials from explicit arguments or a Basic `Authorization` header.
fn credentials(attributes: &Attributes) -> Option<(String, String)> {
    if let Some(username) = attributes.get_str(args::USERNAME) {
        let password = attributes.get_str(args::PASSWORD).unwrap_or_default();
        return Some((username.to_string(), password.to_string()));
    }
    let header = attributes.get_str(args::AUTHORIZATION)?;
    parse_basic(header)
}

fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() {
        return None;
    }
    Some((username.to_string(), password.to_string()))
}

#[async_trait]
impl Authenticator for LdapAuthenticator {
    fn kind(&self) -> &'static str {
        "ldap"
    }

    async fn authenticate(&self, attributes: &Attributes) -> Result<Verdict, AuthError> {
        let Some((username, password)) = credentials(attributes) else {
            tracing::debug!("No credentials in message");
            return Ok(Verdict::deny());
        };
        if password.is_empty() {
            tracing::debug!(username = %username, "Empty password rejected");
            return Ok(Verdict::deny());
        }

        match self.directory.bind_user(&username, &password).await? {
            BindOutcome::Authenticated { dn } => {
                tracing::debug!(username = %username, dn = %dn, "LDAP bind succeeded");
                Ok(Verdict::allow(dn))
            }
            outcome => {
                tracing::debug!(username = %username, outcome = ?outcome, "LDAP bind rejected");
                Ok(Verdict::deny())
            }
        }
    }
}
