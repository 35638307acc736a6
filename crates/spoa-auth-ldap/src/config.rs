//! Directory connection settings.

use std::time::Duration;

use crate::error::{LdapError, Result};

/// Placeholder replaced by the escaped username in [`LdapConfig::user_filter`].
pub const USERNAME_PLACEHOLDER: &str = "{username}";

pub const DEFAULT_PORT: u16 = 389;
pub const DEFAULT_USER_FILTER: &str = "(uid={username})";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LdapConfig {
    pub hostname: String,
    pub port: u16,
    /// Connect with `ldaps://`.
    pub tls: bool,
    /// Service account used to look users up.
    pub bind_dn: String,
    pub bind_password: String,
    pub base_dn: String,
    pub user_filter: String,
    /// Deadline for each directory operation.
    pub timeout: Duration,
}

impl LdapConfig {
    pub fn new(
        hostname: impl Into<String>,
        bind_dn: impl Into<String>,
        bind_password: impl Into<String>,
        base_dn: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            tls: false,
            bind_dn: bind_dn.into(),
            bind_password: bind_password.into(),
            base_dn: base_dn.into(),
            user_filter: DEFAULT_USER_FILTER.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_user_filter(mut self, filter: impl Into<String>) -> Self {
        self.user_filter = filter.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> String {
        let scheme = if self.tls { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.hostname, self.port)
    }

    /// Search filter for `username`, escaped per RFC 4515.
    pub fn filter_for(&self, username: &str) -> String {
        self.user_filter
            .replace(USERNAME_PLACEHOLDER, &ldap3::ldap_escape(username))
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(LdapError::Config("hostname must not be empty".into()));
        }
        if self.base_dn.trim().is_empty() {
            return Err(LdapError::Config("base_dn must not be empty".into()));
        }
        if !self.user_filter.contains(USERNAME_PLACEHOLDER) {
            return Err(LdapError::Config(format!(
                "user_filter must contain {}",
                USERNAME_PLACEHOLDER
            )));
        }
        if self.timeout.is_zero() {
            return Err(LdapError::Config("timeout must be positive".into()));
        }
        Ok(())
    }
}
