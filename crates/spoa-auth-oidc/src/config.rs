//! OIDC authenticator configuration.

use std::time::Duration;

use crate::error::{OidcError, Result};

/// Default lifetime of a session cookie (1 hour).
pub const DEFAULT_COOKIE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default lifetime of a login attempt, from redirect to callback (10 minutes).
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Default deadline for requests to the provider.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Session cookie attributes.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub ttl: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "spoa_auth_session".to_string(),
            domain: None,
            secure: true,
            ttl: DEFAULT_COOKIE_TTL,
        }
    }
}

/// Whether sessions close to expiry are silently extended.
///
/// Has no `Default`; deployments choose explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalPolicy {
    /// Sessions end at their expiry; the user logs in again.
    Disabled,
    /// Sessions within `threshold` of expiry are reissued through a
    /// refresh-token grant.
    Refresh { threshold: Duration },
}

impl RenewalPolicy {
    pub fn is_enabled(&self) -> bool {
        matches!(self, RenewalPolicy::Refresh { .. })
    }
}

/// Everything the OIDC authenticator needs.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer base URL; discovery reads `/.well-known/openid-configuration` below it.
    pub provider_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the provider. Its path is served by the
    /// callback router.
    pub redirect_url: String,
    pub scopes: Vec<String>,
    /// ID token claim used as the identity.
    pub subject_claim: String,
    pub cookie: CookieConfig,
    pub signature_secret: String,
    pub encryption_secret: String,
    pub renewal: RenewalPolicy,
    pub state_ttl: Duration,
    pub http_timeout: Duration,
}

impl OidcConfig {
    pub fn new(
        provider_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
        renewal: RenewalPolicy,
    ) -> Self {
        Self {
            provider_url: provider_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            scopes: vec!["openid".to_string()],
            subject_claim: "sub".to_string(),
            cookie: CookieConfig::default(),
            signature_secret: String::new(),
            encryption_secret: String::new(),
            renewal,
            state_ttl: DEFAULT_STATE_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the signing and encryption secrets.
    pub fn with_secrets(
        mut self,
        signature_secret: impl Into<String>,
        encryption_secret: impl Into<String>,
    ) -> Self {
        self.signature_secret = signature_secret.into();
        self.encryption_secret = encryption_secret.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_subject_claim(mut self, claim: impl Into<String>) -> Self {
        self.subject_claim = claim.into();
        self
    }

    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Path component of the redirect URL.
    pub fn callback_path(&self) -> Result<String> {
        let url = url::Url::parse(&self.redirect_url)
            .map_err(|e| OidcError::Config(format!("invalid redirect_url: {}", e)))?;
        Ok(url.path().to_string())
    }

    /// Check the configuration before any network access.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("provider_url", &self.provider_url),
            ("client_id", &self.client_id),
            ("redirect_url", &self.redirect_url),
            ("signature_secret", &self.signature_secret),
            ("encryption_secret", &self.encryption_secret),
            ("cookie name", &self.cookie.name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(OidcError::Config(format!("{} must not be empty", name)));
            }
        }
        if self.signature_secret == self.encryption_secret {
            return Err(OidcError::Config(
                "signature_secret and encryption_secret must differ".to_string(),
            ));
        }
        if !self.scopes.iter().any(|s| s == "openid") {
            return Err(OidcError::Config(
                "scopes must include \"openid\"".to_string(),
            ));
        }
        self.callback_path()?;
        if let RenewalPolicy::Refresh { threshold } = self.renewal
            && threshold >= self.cookie.ttl
        {
            return Err(OidcError::Config(
                "renewal threshold must be shorter than the cookie TTL".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OidcConfig {
        OidcConfig::new(
            "https://idp.example.com",
            "client",
            "secret",
            "https://app.example.com/oauth2/callback",
            RenewalPolicy::Disabled,
        )
        .with_secrets("sign-me", "hide-me")
    }

    #[test]
    fn test_valid_config() {
        let config = config();
        config.validate().unwrap();
        assert_eq!(config.callback_path().unwrap(), "/oauth2/callback");
        assert_eq!(config.subject_claim, "sub");
    }

    #[test]
    fn test_secrets_must_differ() {
        let config = config().with_secrets("same", "same");
        assert!(matches!(config.validate(), Err(OidcError::Config(_))));
    }

    #[test]
    fn test_missing_secret() {
        let config = config().with_secrets("", "hide-me");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_openid_scope_required() {
        let config = config().with_scopes(vec!["email".into()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_renewal_threshold_below_ttl() {
        let mut config = config();
        config.renewal = RenewalPolicy::Refresh {
            threshold: Duration::from_secs(7200),
        };
        assert!(config.validate().is_err());
        config.renewal = RenewalPolicy::Refresh {
            threshold: Duration::from_secs(300),
        };
        config.validate().unwrap();
        assert!(config.renewal.is_enabled());
    }
}
