//! Anti-forgery state for the authorization-code flow.
//!
//! The `state` parameter sent to the provider is a sealed [`StateClaims`]
//! carrying the original destination and a random nonce. The same nonce is
//! set in a per-flow cookie on the browser that started the login; the
//! callback only succeeds when both agree. Each flow gets its own cookie
//! name, so parallel logins in several tabs do not overwrite each other.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::cookie::find_cookie;
use crate::error::CookieError;
use crate::seal::Sealer;

const LABEL: &str = "state";
const NONCE_BYTES: usize = 24;
const COOKIE_ID_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    pub nonce: String,
    /// Where the browser goes after a successful callback.
    pub dest: String,
    pub iat: i64,
    pub exp: i64,
}

impl StateClaims {
    /// Start a new flow towards `destination`.
    pub fn issue(destination: impl Into<String>, now: i64, ttl: Duration) -> Self {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self {
            nonce: URL_SAFE_NO_PAD.encode(bytes),
            dest: destination.into(),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
        }
    }

    /// Name of the cookie binding this flow to its browser.
    pub fn cookie_name(&self, session_cookie: &str) -> String {
        let id: String = self.nonce.chars().take(COOKIE_ID_LEN).collect();
        format!("{}_state_{}", session_cookie, id)
    }

    pub fn seal(&self, sealer: &Sealer) -> Result<String, CookieError> {
        let json = serde_json::to_vec(self).map_err(|_| CookieError::Invalid)?;
        sealer.seal(LABEL, &json)
    }

    pub fn open(token: &str, sealer: &Sealer, now: i64) -> Result<Self, CookieError> {
        let json = sealer.open(LABEL, token)?;
        let claims: Self = serde_json::from_slice(&json).map_err(|_| CookieError::Invalid)?;
        if now >= claims.exp {
            return Err(CookieError::Expired);
        }
        Ok(claims)
    }

    /// Whether `cookie_header` carries this flow's nonce.
    pub fn is_bound_to(&self, cookie_header: Option<&str>, session_cookie: &str) -> bool {
        let Some(presented) =
            cookie_header.and_then(|h| find_cookie(h, &self.cookie_name(session_cookie)))
        else {
            return false;
        };
        presented.as_bytes().ct_eq(self.nonce.as_bytes()).into()
    }
}
