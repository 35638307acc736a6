//! Turns a loaded configuration into running components.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use spoa_auth_config::{AuthenticatorKind, LdapSection, OidcSection, RenewalConfig, SpoaAuthConfig};
use spoa_auth_ldap::{LdapAuthenticator, LdapConfig, LdapDirectory};
use spoa_auth_oidc::{CookieConfig, OidcConfig, OidcEngine, RenewalPolicy};
use spoa_auth_spop::{AgentConfig, VarScope};
use spoa_auth_types::{AuthenticatorRouter, SharedAuthenticator};

/// Agent listener settings; `listen` overrides `server.addr`.
pub fn agent_config(config: &SpoaAuthConfig, listen: Option<SocketAddr>) -> Result<AgentConfig> {
    let server = &config.server;
    let bind_address = match listen {
        Some(addr) => addr,
        None => server.socket_addr()?,
    };
    let var_scope = VarScope::parse(&server.var_scope)
        .ok_or_else(|| anyhow!("invalid server.var_scope '{}'", server.var_scope))?;

    Ok(AgentConfig::new(bind_address)
        .with_max_frame_size(server.max_frame_size as usize)
        .with_max_in_flight(server.max_in_flight)
        .with_handshake_timeout(Duration::from_secs(server.handshake_timeout_secs))
        .with_processing_timeout(Duration::from_secs(server.processing_timeout_secs))
        .with_reassembly_limits(server.max_reassembly_bytes, server.max_pending_fragments)
        .with_var_scope(var_scope))
}

pub fn oidc_config(section: &OidcSection) -> Result<OidcConfig> {
    let renewal = match section.renewal {
        RenewalConfig::Disabled => RenewalPolicy::Disabled,
        RenewalConfig::Refresh { threshold_secs } => RenewalPolicy::Refresh {
            threshold: Duration::from_secs(threshold_secs),
        },
    };

    Ok(OidcConfig::new(
        &section.provider_url,
        &section.client_id,
        section.client_secret()?.value,
        &section.redirect_url,
        renewal,
    )
    .with_secrets(
        section.signature_secret()?.value,
        section.encryption_secret()?.value,
    )
    .with_scopes(section.scopes.clone())
    .with_subject_claim(&section.subject_claim)
    .with_cookie(CookieConfig {
        name: section.cookie_name.clone(),
        domain: section.cookie_domain.clone(),
        secure: section.cookie_secure,
        ttl: Duration::from_secs(section.cookie_ttl_seconds),
    })
    .with_state_ttl(Duration::from_secs(section.state_ttl_seconds))
    .with_http_timeout(Duration::from_secs(section.http_timeout_seconds)))
}

pub fn ldap_config(section: &LdapSection) -> Result<LdapConfig> {
    Ok(LdapConfig::new(
        &section.hostname,
        &section.user_dn,
        section.password()?.value,
        &section.base_dn,
    )
    .with_port(section.port)
    .with_tls(section.tls)
    .with_user_filter(&section.user_filter)
    .with_timeout(Duration::from_secs(section.timeout_seconds)))
}

/// Everything the agent serves.
pub struct Authenticators {
    pub router: AuthenticatorRouter,
    /// Present when an action uses OIDC; its callback server must run too.
    pub oidc: Option<Arc<OidcEngine>>,
}

/// Build the authenticators the configured actions need.
///
/// OIDC provider discovery happens here, so this fails fast on an
/// unreachable provider.
pub async fn build_authenticators(config: &SpoaAuthConfig) -> Result<Authenticators> {
    let actions = config.effective_actions();
    let uses = |kind: AuthenticatorKind| actions.values().any(|k| *k == kind);

    let oidc = if uses(AuthenticatorKind::Oidc) {
        let section = config
            .oidc
            .as_ref()
            .context("an action uses oidc but [oidc] is not configured")?;
        let engine = OidcEngine::new(oidc_config(section)?)
            .await
            .context("failed to initialise the OIDC authenticator")?;
        Some(Arc::new(engine))
    } else {
        None
    };

    let ldap: Option<SharedAuthenticator> = if uses(AuthenticatorKind::Ldap) {
        let section = config
            .ldap
            .as_ref()
            .context("an action uses ldap but [ldap] is not configured")?;
        let directory = LdapDirectory::new(ldap_config(section)?)
            .context("failed to initialise the LDAP authenticator")?;
        Some(Arc::new(LdapAuthenticator::new(Arc::new(directory))))
    } else {
        None
    };

    let router = build_router(
        &actions,
        oidc.clone().map(|engine| engine as SharedAuthenticator),
        ldap,
    )?;
    Ok(Authenticators { router, oidc })
}

/// Register each action with the authenticator of its kind.
pub fn build_router(
    actions: &BTreeMap<String, AuthenticatorKind>,
    oidc: Option<SharedAuthenticator>,
    ldap: Option<SharedAuthenticator>,
) -> Result<AuthenticatorRouter> {
    let mut builder = AuthenticatorRouter::builder();
    for (action, kind) in actions {
        let authenticator = match kind {
            AuthenticatorKind::Oidc => oidc.as_ref(),
            AuthenticatorKind::Ldap => ldap.as_ref(),
        };
        let Some(authenticator) = authenticator else {
            bail!(
                "action '{}' uses {} but no such authenticator was built",
                action,
                kind.as_str()
            );
        };
        builder.register(action.clone(), Arc::clone(authenticator))?;
    }
    Ok(builder.build())
}
