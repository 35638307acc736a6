//! OpenID provider client: discovery, authorization URL, token endpoint.
//!
//! ID tokens are verified against the provider's published signing keys
//! (`jwks_uri`, fetched at discovery) before their `iss`, `aud` and `exp`
//! claims are trusted.

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::OidcConfig;
use crate::error::{OidcError, Result};

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Signature algorithms accepted on ID tokens.
const ID_TOKEN_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// The subset of provider metadata this agent uses.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Provider {
    metadata: ProviderMetadata,
    keys: JwkSet,
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    scopes: Vec<String>,
    subject_claim: String,
}

impl Provider {
    /// Fetch the provider metadata named by `config.provider_url`.
    pub async fn discover(config: &OidcConfig) -> Result<Self> {
        let http = build_client(config)?;
        let url = format!(
            "{}{}",
            config.provider_url.trim_end_matches('/'),
            DISCOVERY_PATH
        );
        tracing::debug!(url = %url, "Fetching provider metadata");

        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| OidcError::Discovery(format!("request to {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(OidcError::Discovery(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| OidcError::Discovery(format!("invalid metadata document: {}", e)))?;

        let keys = fetch_jwks(&http, &metadata.jwks_uri).await?;

        tracing::info!(
            issuer = %metadata.issuer,
            token_endpoint = %metadata.token_endpoint,
            signing_keys = keys.keys.len(),
            "Discovered OpenID provider"
        );
        Ok(Self::with_client(metadata, keys, http, config))
    }

    /// Use already-known metadata and signing keys.
    pub fn from_metadata(metadata: ProviderMetadata, keys: JwkSet, config: &OidcConfig) -> Result<Self> {
        Ok(Self::with_client(metadata, keys, build_client(config)?, config))
    }

    fn with_client(
        metadata: ProviderMetadata,
        keys: JwkSet,
        http: reqwest::Client,
        config: &OidcConfig,
    ) -> Self {
        Self {
            metadata,
            keys,
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            scopes: config.scopes.clone(),
            subject_claim: config.subject_claim.clone(),
        }
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Signing keys the ID tokens are verified against.
    pub fn keys(&self) -> &JwkSet {
        &self.keys
    }

    /// Authorization endpoint URL for a new login carrying `state`.
    pub fn authorization_url(&self, state: &str) -> String {
        let scope = self.scopes.join(" ");
        let params = [
            ("response_type", "code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if self.metadata.authorization_endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}{}",
            self.metadata.authorization_endpoint, separator, query
        )
    }

    /// Redeem an authorization code.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.token_request(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_url),
            ],
            "code exchange",
        )
        .await
    }

    /// Redeem a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            "refresh",
        )
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)], grant: &str) -> Result<TokenResponse> {
        // client_secret_basic: credentials are form-encoded before base64.
        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .basic_auth(
                urlencoding::encode(&self.client_id),
                Some(urlencoding::encode(&self.client_secret)),
            )
            .form(params)
            .send()
            .await
            .map_err(|e| OidcError::TokenExchangeFailed(format!("{} request failed: {}", grant, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(OidcError::TokenExchangeFailed(format!(
                "{} returned {}: {}",
                grant, status, body
            )));
        }

        response.json().await.map_err(|e| {
            OidcError::TokenExchangeFailed(format!("invalid {} response: {}", grant, e))
        })
    }

    /// Extract the configured subject claim from a token response.
    pub fn subject(&self, tokens: &TokenResponse) -> Result<String> {
        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| OidcError::InvalidIdToken("token response has no id_token".into()))?;
        self.subject_from_id_token(id_token)
    }

    /// Verify an ID token and return its subject.
    ///
    /// The signature must check out against the provider's keys; `iss` must be
    /// the discovered issuer, `aud` must include this client and `exp` must
    /// not have passed.
    pub fn subject_from_id_token(&self, id_token: &str) -> Result<String> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| OidcError::InvalidIdToken(format!("unreadable header: {}", e)))?;
        if !ID_TOKEN_ALGORITHMS.contains(&header.alg) {
            return Err(OidcError::InvalidIdToken(format!(
                "algorithm {:?} not accepted",
                header.alg
            )));
        }

        let jwk = self.signing_key(header.kid.as_deref())?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| OidcError::InvalidIdToken(format!("unusable signing key: {}", e)))?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.metadata.issuer.as_str()]);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let claims = jsonwebtoken::decode::<serde_json::Map<String, serde_json::Value>>(
            id_token,
            &key,
            &validation,
        )
        .map_err(|e| OidcError::InvalidIdToken(e.to_string()))?
        .claims;

        match claims.get(&self.subject_claim) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
            _ => Err(OidcError::InvalidIdToken(format!(
                "claim {:?} missing",
                self.subject_claim
            ))),
        }
    }

    /// The key named by `kid`, or the only key when the token names none.
    fn signing_key(&self, kid: Option<&str>) -> Result<&Jwk> {
        let key = match kid {
            Some(kid) => self.keys.find(kid),
            None => match self.keys.keys.as_slice() {
                [only] => Some(only),
                _ => None,
            },
        };
        key.ok_or_else(|| {
            OidcError::InvalidIdToken(format!(
                "no signing key {:?} published by the provider",
                kid.unwrap_or("<none>")
            ))
        })
    }
}

async fn fetch_jwks(http: &reqwest::Client, jwks_uri: &str) -> Result<JwkSet> {
    let response = http
        .get(jwks_uri)
        .send()
        .await
        .map_err(|e| OidcError::Discovery(format!("request to {} failed: {}", jwks_uri, e)))?;
    if !response.status().is_success() {
        return Err(OidcError::Discovery(format!(
            "{} returned {}",
            jwks_uri,
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| OidcError::Discovery(format!("invalid JWKS document: {}", e)))
}

fn build_client(config: &OidcConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| OidcError::Config(format!("cannot build HTTP client: {}", e)))
}
