//! The OIDC session engine and its [`Authenticator`] implementation.
//!
//! The engine holds only configuration, provider metadata and the sealing
//! keys. Every fact about a browser's login lives in cookies it carries, so
//! any number of agent instances sharing the same secrets serve the same
//! sessions.

use async_trait::async_trait;
use spoa_auth_types::{Attributes, AuthError, Authenticator, Verdict, vars};

use crate::config::{OidcConfig, RenewalPolicy};
use crate::cookie::{SetCookie, find_cookie};
use crate::error::{CookieError, OidcError, Result};
use crate::provider::Provider;
use crate::seal::Sealer;
use crate::session::SessionClaims;
use crate::state::StateClaims;

/// Message arguments read by the OIDC authenticator.
pub mod args {
    /// Raw `Cookie` request header.
    pub const COOKIE: &str = "arg_cookie";
    /// Whether the original request arrived over TLS.
    pub const SSL: &str = "arg_ssl";
    /// `Host` request header.
    pub const HOST: &str = "arg_host";
    /// Path and query of the original request.
    pub const PATHQ: &str = "arg_pathq";
}

/// Where to send an unauthenticated browser.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub url: String,
    /// Binds the flow's state to this browser.
    pub state_cookie: SetCookie,
}

/// Result of a successful callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub destination: String,
    pub subject: String,
    pub cookies: Vec<SetCookie>,
}

#[derive(Debug)]
pub struct OidcEngine {
    config: OidcConfig,
    provider: Provider,
    sealer: Sealer,
    callback_path: String,
}

impl OidcEngine {
    /// Validate `config` and discover the provider.
    pub async fn new(config: OidcConfig) -> Result<Self> {
        config.validate()?;
        let provider = Provider::discover(&config).await?;
        Self::with_provider(config, provider)
    }

    /// Build an engine around an already-discovered provider.
    pub fn with_provider(config: OidcConfig, provider: Provider) -> Result<Self> {
        config.validate()?;
        let sealer = Sealer::new(
            config.encryption_secret.as_bytes(),
            config.signature_secret.as_bytes(),
        );
        let callback_path = config.callback_path()?;
        Ok(Self {
            config,
            provider,
            sealer,
            callback_path,
        })
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    fn cookie(&self, name: String, value: String, ttl: std::time::Duration) -> SetCookie {
        SetCookie::new(name, value, ttl)
            .with_domain(self.config.cookie.domain.clone())
            .with_secure(self.config.cookie.secure)
    }

    /// Start a login that returns to `destination`.
    pub fn begin(&self, destination: &str, now: i64) -> Result<LoginRedirect> {
        let state = StateClaims::issue(destination, now, self.config.state_ttl);
        let token = state.seal(&self.sealer)?;
        let state_cookie = self.cookie(
            state.cookie_name(&self.config.cookie.name),
            state.nonce.clone(),
            self.config.state_ttl,
        );
        Ok(LoginRedirect {
            url: self.provider.authorization_url(&token),
            state_cookie,
        })
    }

    /// Recover the session from a `Cookie` header, if one is present.
    pub fn check_session(
        &self,
        cookie_header: Option<&str>,
        now: i64,
    ) -> std::result::Result<Option<SessionClaims>, CookieError> {
        let Some(token) = cookie_header.and_then(|h| find_cookie(h, &self.config.cookie.name))
        else {
            return Ok(None);
        };
        SessionClaims::open(token, &self.sealer, now).map(Some)
    }

    fn session_cookie(&self, session: &SessionClaims) -> Result<SetCookie> {
        Ok(self.cookie(
            self.config.cookie.name.clone(),
            session.seal(&self.sealer)?,
            self.config.cookie.ttl,
        ))
    }

    /// Finish a login: check the state, redeem the code, issue the session.
    pub async fn complete_callback(
        &self,
        code: &str,
        state: &str,
        cookie_header: Option<&str>,
        now: i64,
    ) -> Result<CallbackOutcome> {
        let state = StateClaims::open(state, &self.sealer, now)
            .map_err(|e| OidcError::InvalidState(e.to_string()))?;
        if !state.is_bound_to(cookie_header, &self.config.cookie.name) {
            return Err(OidcError::InvalidState(
                "state was not issued to this browser".to_string(),
            ));
        }

        let tokens = self.provider.exchange_code(code).await?;
        let subject = self.provider.subject(&tokens)?;
        let refresh_token = if self.config.renewal.is_enabled() {
            tokens.refresh_token
        } else {
            None
        };

        let session = SessionClaims::new(subject.clone(), now, self.config.cookie.ttl, refresh_token);
        let cookies = vec![
            self.session_cookie(&session)?,
            SetCookie::removal(state.cookie_name(&self.config.cookie.name))
                .with_domain(self.config.cookie.domain.clone())
                .with_secure(self.config.cookie.secure),
        ];

        tracing::info!(subject = %subject, "OIDC login completed");
        Ok(CallbackOutcome {
            destination: state.dest,
            subject,
            cookies,
        })
    }

    /// Reissue `session` if it is close to expiry and renewal is enabled.
    ///
    /// Failures leave the current cookie in place until it expires.
    pub async fn renew(&self, session: &SessionClaims, now: i64) -> Option<SetCookie> {
        let RenewalPolicy::Refresh { threshold } = self.config.renewal else {
            return None;
        };
        let threshold = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);
        if session.remaining(now) > threshold {
            return None;
        }
        let refresh_token = session.rt.as_deref()?;

        let tokens = match self.provider.refresh(refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(subject = %session.sub, error = %e, "Session renewal failed");
                return None;
            }
        };

        let renewed = SessionClaims::new(
            session.sub.clone(),
            now,
            self.config.cookie.ttl,
            tokens.refresh_token.or_else(|| session.rt.clone()),
        );
        match self.session_cookie(&renewed) {
            Ok(cookie) => {
                tracing::debug!(subject = %session.sub, "Session renewed");
                Some(cookie)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to seal renewed session");
                None
            }
        }
    }

    /// Evaluate one request at time `now`.
    pub async fn evaluate(
        &self,
        attributes: &Attributes,
        now: i64,
    ) -> std::result::Result<Verdict, AuthError> {
        match self.check_session(attributes.get_str(args::COOKIE), now) {
            Ok(Some(session)) => {
                let mut verdict = Verdict::allow(session.sub.clone());
                if let Some(cookie) = self.renew(&session, now).await {
                    verdict = verdict.with_variable(vars::SET_COOKIE, cookie.to_string());
                }
                return Ok(verdict);
            }
            Ok(None) => {}
            Err(reason) => {
                tracing::debug!(reason = %reason, "Session cookie rejected");
            }
        }

        let destination = original_destination(attributes)?;
        let login = self
            .begin(&destination, now)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(Verdict::redirect(login.url)
            .with_variable(vars::STATE_COOKIE, login.state_cookie.to_string()))
    }
}

/// Rebuild the URL the browser originally asked for.
fn original_destination(attributes: &Attributes) -> std::result::Result<String, AuthError> {
    let host = attributes
        .get_str(args::HOST)
        .ok_or_else(|| AuthError::InvalidRequest(format!("missing {}", args::HOST)))?;
    let scheme = if attributes.get_bool(args::SSL).unwrap_or(false) {
        "https"
    } else {
        "http"
    };
    let pathq = attributes.get_str(args::PATHQ).unwrap_or("/");
    if pathq.starts_with('/') {
        Ok(format!("{}://{}{}", scheme, host, pathq))
    } else {
        Ok(format!("{}://{}/{}", scheme, host, pathq))
    }
}

#[async_trait]
impl Authenticator for OidcEngine {
    fn kind(&self) -> &'static str {
        "oidc"
    }

    async fn authenticate(&self, attributes: &Attributes) -> std::result::Result<Verdict, AuthError> {
        self.evaluate(attributes, chrono::Utc::now().timestamp()).await
    }
}
