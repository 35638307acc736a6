//! Directory access.
//!
//! [`Directory`] is the seam between credential checking and the network:
//! [`LdapDirectory`] talks to a real server, tests substitute their own.

use std::future::Future;

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};

use crate::config::LdapConfig;
use crate::error::{LdapError, Result};

/// `invalidCredentials` result code.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Answer to a credential check that the directory was able to give.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Authenticated { dn: String },
    InvalidCredentials,
    UnknownUser,
    /// The filter matched more than one entry.
    Ambiguous,
}

#[async_trait]
pub trait Directory: Send + Sync + std::fmt::Debug {
    /// Resolve `username` and bind as it with `password`.
    async fn bind_user(&self, username: &str, password: &str) -> Result<BindOutcome>;
}

/// [`Directory`] backed by an LDAP server.
///
/// Opens one connection per check: service bind, search, user bind, unbind.
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    config: LdapConfig,
}

impl LdapDirectory {
    pub fn new(config: LdapConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ldap3::LdapError>>,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(result) => result.map_err(|e| LdapError::Operation {
                operation,
                message: e.to_string(),
            }),
            Err(_) => Err(LdapError::Timeout {
                operation,
                ms: self.config.timeout.as_millis() as u64,
            }),
        }
    }

    async fn check(
        &self,
        ldap: &mut ldap3::Ldap,
        username: &str,
        password: &str,
    ) -> Result<BindOutcome> {
        let service = self
            .bounded(
                "service bind",
                ldap.simple_bind(&self.config.bind_dn, &self.config.bind_password),
            )
            .await?;
        if service.rc != 0 {
            return Err(LdapError::Operation {
                operation: "service bind",
                message: format!("rc={} {}", service.rc, service.text),
            });
        }

        let filter = self.config.filter_for(username);
        let (entries, _) = self
            .bounded(
                "search",
                ldap.search(&self.config.base_dn, Scope::Subtree, &filter, vec!["1.1"]),
            )
            .await?
            .success()
            .map_err(|e| LdapError::Operation {
                operation: "search",
                message: e.to_string(),
            })?;

        let mut entries = entries.into_iter();
        let dn = match (entries.next(), entries.next()) {
            (None, _) => return Ok(BindOutcome::UnknownUser),
            (Some(entry), None) => SearchEntry::construct(entry).dn,
            (Some(_), Some(_)) => return Ok(BindOutcome::Ambiguous),
        };

        let user = self
            .bounded("user bind", ldap.simple_bind(&dn, password))
            .await?;
        bind_outcome(user.rc, &user.text, dn)
    }
}

/// Map the result code of a user bind to an answer.
///
/// Only success and `invalidCredentials` are answers; any other code means
/// the directory could not decide.
pub(crate) fn bind_outcome(rc: u32, text: &str, dn: String) -> Result<BindOutcome> {
    match rc {
        0 => Ok(BindOutcome::Authenticated { dn }),
        RC_INVALID_CREDENTIALS => Ok(BindOutcome::InvalidCredentials),
        rc => Err(LdapError::Operation {
            operation: "user bind",
            message: format!("rc={} {}", rc, text),
        }),
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn bind_user(&self, username: &str, password: &str) -> Result<BindOutcome> {
        // An empty password would be an unauthenticated bind, which succeeds.
        if password.is_empty() {
            return Ok(BindOutcome::InvalidCredentials);
        }

        let url = self.config.url();
        let settings = LdapConnSettings::new().set_conn_timeout(self.config.timeout);
        let (conn, mut ldap) = self
            .bounded("connect", LdapConnAsync::with_settings(settings, &url))
            .await
            .map_err(|e| match e {
                LdapError::Operation { message, .. } => LdapError::Connect {
                    url: url.clone(),
                    message,
                },
                other => other,
            })?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::debug!(error = %e, "LDAP connection closed with error");
            }
        });

        let outcome = self.check(&mut ldap, username, password).await;
        if let Err(e) = self.bounded("unbind", ldap.unbind()).await {
            tracing::debug!(error = %e, "LDAP unbind failed");
        }
        outcome
    }
}
