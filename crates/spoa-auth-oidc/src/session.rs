//! Client-held session cookie contents.
//!
//! The session lives only in the browser: the agent seals these claims into
//! the cookie and recovers them on every request. Nothing is stored
//! server-side, so a session ends when its cookie expires or fails to open.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CookieError;
use crate::seal::Sealer;

const LABEL: &str = "session";

/// Sealed into the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Authenticated subject.
    pub sub: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expires-at, unix seconds.
    pub exp: i64,
    /// Refresh token, kept only when renewal is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rt: Option<String>,
}

impl SessionClaims {
    pub fn new(
        subject: impl Into<String>,
        now: i64,
        ttl: Duration,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            sub: subject.into(),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            rt: refresh_token,
        }
    }

    /// Seconds until expiry (negative once expired).
    pub fn remaining(&self, now: i64) -> i64 {
        self.exp - now
    }

    pub fn seal(&self, sealer: &Sealer) -> Result<String, CookieError> {
        let json = serde_json::to_vec(self).map_err(|_| CookieError::Invalid)?;
        sealer.seal(LABEL, &json)
    }

    /// Open a session cookie and check it is still valid at `now`.
    pub fn open(token: &str, sealer: &Sealer, now: i64) -> Result<Self, CookieError> {
        let json = sealer.open(LABEL, token)?;
        let claims: Self = serde_json::from_slice(&json).map_err(|_| CookieError::Invalid)?;
        if now >= claims.exp {
            return Err(CookieError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealer() -> Sealer {
        Sealer::new(b"enc", b"sig")
    }

    #[test]
    fn test_valid_just_before_expiry_and_expired_just_after() {
        let sealer = sealer();
        let ttl = Duration::from_secs(3600);
        let issued = 1_700_000_000;
        let token = SessionClaims::new("alice", issued, ttl, None)
            .seal(&sealer)
            .unwrap();

        let expiry = issued + 3600;
        let claims = SessionClaims::open(&token, &sealer, expiry - 1).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(
            SessionClaims::open(&token, &sealer, expiry + 1),
            Err(CookieError::Expired)
        );
        assert_eq!(
            SessionClaims::open(&token, &sealer, expiry),
            Err(CookieError::Expired)
        );
    }

    #[test]
    fn test_refresh_token_survives_sealing() {
        let sealer = sealer();
        let claims = SessionClaims::new("bob", 100, Duration::from_secs(60), Some("rt-1".into()));
        let token = claims.seal(&sealer).unwrap();
        assert_eq!(SessionClaims::open(&token, &sealer, 120).unwrap(), claims);
        assert_eq!(claims.remaining(120), 40);
    }

    #[test]
    fn test_tampered_cookie_rejected_before_expiry_check() {
        let sealer = sealer();
        let token = SessionClaims::new("alice", 0, Duration::from_secs(10), None)
            .seal(&sealer)
            .unwrap();
        let tampered = format!("B{}", &token[1..]);
        // Even long after expiry, a bad signature is reported as such.
        assert_eq!(
            SessionClaims::open(&tampered, &sealer, 1_000_000),
            Err(CookieError::InvalidSignature)
        );
    }
}
