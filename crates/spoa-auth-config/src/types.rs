//! Configuration file schema.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::secrets::{ResolvedSecret, resolve_secret};

/// Conventional action names bound when `[actions]` is empty.
pub const DEFAULT_OIDC_ACTION: &str = "try-auth-oidc";
pub const DEFAULT_LDAP_ACTION: &str = "try-auth-ldap";

const DEFAULT_LOG_LEVEL: &str = "info";
const VAR_SCOPES: [&str; 5] = ["proc", "sess", "txn", "req", "res"];
const MIN_FRAME_SIZE: u32 = 256;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoaAuthConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub oidc: Option<OidcSection>,
    pub ldap: Option<LdapSection>,
    /// Action name → authenticator.
    pub actions: BTreeMap<String, AuthenticatorKind>,
}

impl SpoaAuthConfig {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str::<Self>(toml_str)?.with_server_log_level())
    }

    /// Parse from a YAML string.
    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        Ok(serde_yaml::from_str::<Self>(yaml_str)?.with_server_log_level())
    }

    /// Honor `server.log_level` from older files.
    ///
    /// A `[logging]` level other than the default wins over it.
    fn with_server_log_level(mut self) -> Self {
        if let Some(level) = &self.server.log_level
            && self.logging.log_level == DEFAULT_LOG_LEVEL
        {
            self.logging.log_level = level.clone();
        }
        self
    }

    /// Action bindings, falling back to the conventional names for each
    /// configured authenticator when none are given.
    pub fn effective_actions(&self) -> BTreeMap<String, AuthenticatorKind> {
        if !self.actions.is_empty() {
            return self.actions.clone();
        }
        let mut actions = BTreeMap::new();
        if self.oidc.is_some() {
            actions.insert(DEFAULT_OIDC_ACTION.to_string(), AuthenticatorKind::Oidc);
        }
        if self.ldap.is_some() {
            actions.insert(DEFAULT_LDAP_ACTION.to_string(), AuthenticatorKind::Ldap);
        }
        actions
    }

    /// Check everything that can be checked without network access.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;

        let actions = self.effective_actions();
        if actions.is_empty() {
            return Err(ConfigError::NoActions);
        }
        for (action, kind) in &actions {
            let configured = match kind {
                AuthenticatorKind::Oidc => self.oidc.is_some(),
                AuthenticatorKind::Ldap => self.ldap.is_some(),
            };
            if !configured {
                return Err(ConfigError::UnconfiguredAuthenticator {
                    action: action.clone(),
                    kind: kind.as_str().to_string(),
                });
            }
        }

        if let Some(oidc) = &self.oidc {
            oidc.validate()?;
        }
        if let Some(ldap) = &self.ldap {
            ldap.validate()?;
        }
        Ok(())
    }
}

/// Which authenticator an action is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorKind {
    Oidc,
    Ldap,
}

impl AuthenticatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticatorKind::Oidc => "oidc",
            AuthenticatorKind::Ldap => "ldap",
        }
    }
}

fn require(value: &str, field: &str, context: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_string(),
            context: context.to_string(),
        });
    }
    Ok(())
}

fn parse_addr(value: &str, field: &str) -> Result<SocketAddr> {
    value.parse().map_err(|e| ConfigError::Invalid {
        field: field.to_string(),
        reason: format!("'{}' is not a socket address: {}", value, e),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Agent listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the proxy connects to.
    pub addr: String,
    pub max_frame_size: u32,
    /// Concurrent authenticator calls per connection.
    pub max_in_flight: usize,
    pub handshake_timeout_secs: u64,
    /// Deadline for evaluating all messages of one NOTIFY.
    pub processing_timeout_secs: u64,
    pub max_reassembly_bytes: usize,
    pub max_pending_fragments: usize,
    /// Scope of the variables set in ACKs.
    pub var_scope: String,
    /// Older spelling of `logging.log_level`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:12345".to_string(),
            max_frame_size: 16_384,
            max_in_flight: 64,
            handshake_timeout_secs: 5,
            processing_timeout_secs: 10,
            max_reassembly_bytes: 1024 * 1024,
            max_pending_fragments: 64,
            var_scope: "sess".to_string(),
            log_level: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.addr, "server.addr")
    }

    fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.max_frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::Invalid {
                field: "server.max_frame_size".to_string(),
                reason: format!("must be at least {}", MIN_FRAME_SIZE),
            });
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                field: "server.max_in_flight".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.processing_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "server timeouts".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !VAR_SCOPES.contains(&self.var_scope.as_str()) {
            return Err(ConfigError::Invalid {
                field: "server.var_scope".to_string(),
                reason: format!("expected one of {}", VAR_SCOPES.join(", ")),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `info` or `debug`; any `EnvFilter` directive is accepted.
    pub log_level: String,
    /// When set, JSON logs are also written to daily files here.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
            file_prefix: "spoa-auth.log".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OIDC Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// `[oidc]` section. Secrets are given inline or through `*_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcSection {
    pub provider_url: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_secret_env: Option<String>,
    pub redirect_url: String,
    /// Where the callback server listens.
    #[serde(default = "default_callback_addr")]
    pub callback_addr: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default)]
    pub cookie_domain: Option<String>,
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    #[serde(default = "default_cookie_ttl")]
    pub cookie_ttl_seconds: u64,
    #[serde(default)]
    pub signature_secret: Option<String>,
    #[serde(default)]
    pub signature_secret_env: Option<String>,
    #[serde(default)]
    pub encryption_secret: Option<String>,
    #[serde(default)]
    pub encryption_secret_env: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_subject_claim")]
    pub subject_claim: String,
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// Required; there is no implicit renewal behaviour.
    pub renewal: RenewalConfig,
}

/// Session renewal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RenewalConfig {
    Disabled,
    Refresh { threshold_secs: u64 },
}

fn default_callback_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_cookie_name() -> String {
    "spoa_auth_session".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cookie_ttl() -> u64 {
    3600
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string()]
}

fn default_subject_claim() -> String {
    "sub".to_string()
}

fn default_state_ttl() -> u64 {
    600
}

fn default_http_timeout() -> u64 {
    10
}

impl OidcSection {
    pub fn client_secret(&self) -> Result<ResolvedSecret> {
        resolve_secret(
            "oidc.client_secret",
            self.client_secret.as_deref(),
            self.client_secret_env.as_deref(),
        )
    }

    pub fn signature_secret(&self) -> Result<ResolvedSecret> {
        resolve_secret(
            "oidc.signature_secret",
            self.signature_secret.as_deref(),
            self.signature_secret_env.as_deref(),
        )
    }

    pub fn encryption_secret(&self) -> Result<ResolvedSecret> {
        resolve_secret(
            "oidc.encryption_secret",
            self.encryption_secret.as_deref(),
            self.encryption_secret_env.as_deref(),
        )
    }

    pub fn callback_socket_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.callback_addr, "oidc.callback_addr")
    }

    fn validate(&self) -> Result<()> {
        require(&self.provider_url, "provider_url", "[oidc]")?;
        require(&self.client_id, "client_id", "[oidc]")?;
        require(&self.redirect_url, "redirect_url", "[oidc]")?;
        require(&self.cookie_name, "cookie_name", "[oidc]")?;
        self.callback_socket_addr()?;
        self.client_secret()?;

        let signature = self.signature_secret()?;
        let encryption = self.encryption_secret()?;
        if signature.value == encryption.value {
            return Err(ConfigError::Invalid {
                field: "oidc.encryption_secret".to_string(),
                reason: "must differ from signature_secret".to_string(),
            });
        }
        if self.cookie_ttl_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "oidc.cookie_ttl_seconds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let RenewalConfig::Refresh { threshold_secs } = self.renewal
            && threshold_secs >= self.cookie_ttl_seconds
        {
            return Err(ConfigError::Invalid {
                field: "oidc.renewal.threshold_secs".to_string(),
                reason: "must be shorter than cookie_ttl_seconds".to_string(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LDAP Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// `[ldap]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapSection {
    pub hostname: String,
    #[serde(default = "default_ldap_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// Service account DN.
    pub user_dn: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_env: Option<String>,
    pub base_dn: String,
    /// Search filter; `{username}` is replaced by the escaped username.
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
    #[serde(default = "default_ldap_timeout")]
    pub timeout_seconds: u64,
}

fn default_ldap_port() -> u16 {
    389
}

fn default_user_filter() -> String {
    "(uid={username})".to_string()
}

fn default_ldap_timeout() -> u64 {
    5
}

impl LdapSection {
    pub fn password(&self) -> Result<ResolvedSecret> {
        resolve_secret(
            "ldap.password",
            self.password.as_deref(),
            self.password_env.as_deref(),
        )
    }

    fn validate(&self) -> Result<()> {
        require(&self.hostname, "hostname", "[ldap]")?;
        require(&self.user_dn, "user_dn", "[ldap]")?;
        require(&self.base_dn, "base_dn", "[ldap]")?;
        self.password()?;
        if !self.user_filter.contains("{username}") {
            return Err(ConfigError::Invalid {
                field: "ldap.user_filter".to_string(),
                reason: "must contain {username}".to_string(),
            });
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "ldap.timeout_seconds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[server]
addr = "0.0.0.0:12345"
max_in_flight = 16

[logging]
log_level = "debug"

[oidc]
provider_url = "https://idp.example.com"
client_id = "app"
client_secret = "client-secret"
redirect_url = "https://app.example.com/oauth2/callback"
cookie_domain = "example.com"
signature_secret = "sign"
encryption_secret = "encrypt"
scopes = ["openid", "email"]
renewal = { mode = "refresh", threshold_secs = 300 }

[ldap]
hostname = "ldap.example.com"
user_dn = "cn=admin,dc=example,dc=com"
password = "admin"
base_dn = "dc=example,dc=com"

[actions]
try-auth-oidc = "oidc"
try-auth-ldap = "ldap"
"#;

    #[test]
    fn test_parse_full() {
        let config = SpoaAuthConfig::from_toml(FULL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.max_in_flight, 16);
        assert_eq!(config.server.max_frame_size, 16_384);
        assert_eq!(config.logging.log_level, "debug");

        let oidc = config.oidc.as_ref().unwrap();
        assert_eq!(oidc.cookie_name, "spoa_auth_session");
        assert!(oidc.cookie_secure);
        assert_eq!(
            oidc.renewal,
            RenewalConfig::Refresh {
                threshold_secs: 300
            }
        );
        assert_eq!(config.ldap.as_ref().unwrap().port, 389);
        assert_eq!(
            config.actions.get("try-auth-ldap"),
            Some(&AuthenticatorKind::Ldap)
        );
    }

    #[test]
    fn test_server_log_level_is_honored() {
        let toml = FULL.replace("[logging]\nlog_level = \"debug\"\n", "");
        let toml = toml.replace("max_in_flight = 16\n", "max_in_flight = 16\nlog_level = \"trace\"\n");
        let config = SpoaAuthConfig::from_toml(&toml).unwrap();
        assert_eq!(config.server.log_level.as_deref(), Some("trace"));
        assert_eq!(config.logging.log_level, "trace");

        let yaml = "server:\n  log_level: debug\n";
        assert_eq!(SpoaAuthConfig::from_yaml(yaml).unwrap().logging.log_level, "debug");

        // An explicit [logging] level takes precedence.
        let both = FULL.replace("max_in_flight = 16\n", "max_in_flight = 16\nlog_level = \"trace\"\n");
        assert_eq!(SpoaAuthConfig::from_toml(&both).unwrap().logging.log_level, "debug");
    }

    #[test]
    fn test_renewal_is_required() {
        let toml = FULL.replace(
            "renewal = { mode = \"refresh\", threshold_secs = 300 }\n",
            "",
        );
        let err = SpoaAuthConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("renewal"), "{err}");
    }

    #[test]
    fn test_renewal_disabled() {
        let toml = FULL.replace(
            "renewal = { mode = \"refresh\", threshold_secs = 300 }",
            "renewal = { mode = \"disabled\" }",
        );
        let config = SpoaAuthConfig::from_toml(&toml).unwrap();
        assert_eq!(config.oidc.unwrap().renewal, RenewalConfig::Disabled);
    }

    #[test]
    fn test_default_actions() {
        let toml = FULL.split("[actions]").next().unwrap();
        let config = SpoaAuthConfig::from_toml(toml).unwrap();
        let actions = config.effective_actions();
        assert_eq!(actions.get(DEFAULT_OIDC_ACTION), Some(&AuthenticatorKind::Oidc));
        assert_eq!(actions.get(DEFAULT_LDAP_ACTION), Some(&AuthenticatorKind::Ldap));
    }

    #[test]
    fn test_action_bound_to_missing_section() {
        let config = SpoaAuthConfig::from_toml(
            r#"
[actions]
check = "ldap"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnconfiguredAuthenticator { .. })
        ));
    }

    #[test]
    fn test_no_actions() {
        let config = SpoaAuthConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::NoActions)));
    }

    #[test]
    fn test_invalid_server_values() {
        let mut config = SpoaAuthConfig::from_toml(FULL).unwrap();
        config.server.max_frame_size = 100;
        assert!(config.validate().is_err());

        let mut config = SpoaAuthConfig::from_toml(FULL).unwrap();
        config.server.var_scope = "global".to_string();
        assert!(config.validate().is_err());

        let mut config = SpoaAuthConfig::from_toml(FULL).unwrap();
        config.server.addr = "not-an-address".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_identical_secrets_rejected() {
        let toml = FULL.replace("encryption_secret = \"encrypt\"", "encryption_secret = \"sign\"");
        let config = SpoaAuthConfig::from_toml(&toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_secret() {
        let toml = FULL.replace("signature_secret = \"sign\"\n", "");
        let config = SpoaAuthConfig::from_toml(&toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_yaml() {
        let yaml = r#"
server:
  addr: "127.0.0.1:9000"
ldap:
  hostname: ldap.example.com
  user_dn: cn=admin,dc=example,dc=com
  password: admin
  base_dn: dc=example,dc=com
  user_filter: "(&(objectClass=person)(uid={username}))"
"#;
        let config = SpoaAuthConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(
            config.effective_actions().get(DEFAULT_LDAP_ACTION),
            Some(&AuthenticatorKind::Ldap)
        );
    }
}
