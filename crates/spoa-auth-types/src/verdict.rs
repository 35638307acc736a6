//! Authentication verdicts.

use crate::error::AuthError;
use crate::value::TypedData;

/// Names of the variables returned to the proxy.
pub mod vars {
    /// Boolean, always present.
    pub const AUTHENTICATED: &str = "authenticated";
    /// Resolved identity (OIDC subject or LDAP DN) on success.
    pub const IDENTITY: &str = "identity";
    /// Target URL when the request must be redirected.
    pub const REDIRECT: &str = "redirect";
    /// Set when the verdict was produced because a dependency failed.
    pub const HAS_ERROR: &str = "has_error";
    /// Short machine-readable failure reason.
    pub const ERROR_REASON: &str = "error_reason";
    /// `Set-Cookie` value for a renewed session cookie.
    pub const SET_COOKIE: &str = "set_cookie";
    /// `Set-Cookie` value binding an OIDC state token to the browser.
    pub const STATE_COOKIE: &str = "state_cookie";
}

/// The decision part of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Redirect,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::Redirect => "redirect",
        }
    }
}

/// A named output variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: TypedData,
}

/// Outcome of one authenticator invocation.
///
/// Constructors always populate [`vars::AUTHENTICATED`] so the proxy can rely
/// on it being set for every evaluated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub variables: Vec<Variable>,
    pub redirect: Option<String>,
}

impl Verdict {
    /// The request is authenticated as `identity`.
    pub fn allow(identity: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            variables: vec![
                Variable::new(vars::AUTHENTICATED, true),
                Variable::new(vars::IDENTITY, identity.into()),
            ],
            redirect: None,
        }
    }

    /// The request is not authenticated.
    pub fn deny() -> Self {
        Self {
            decision: Decision::Deny,
            variables: vec![Variable::new(vars::AUTHENTICATED, false)],
            redirect: None,
        }
    }

    /// The client must be sent to `target` before it can be authenticated.
    pub fn redirect(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            decision: Decision::Redirect,
            variables: vec![
                Variable::new(vars::AUTHENTICATED, false),
                Variable::new(vars::REDIRECT, target.clone()),
            ],
            redirect: Some(target),
        }
    }

    /// Deny because a dependency could not be consulted.
    pub fn upstream_failure(reason: impl Into<String>) -> Self {
        Self::deny()
            .with_variable(vars::HAS_ERROR, true)
            .with_variable(vars::ERROR_REASON, reason.into())
    }

    /// Map an authenticator failure onto the verdict reported to the proxy.
    pub fn from_failure(error: &AuthError) -> Self {
        Self::upstream_failure(error.reason())
    }

    /// Append an output variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<TypedData>) -> Self {
        self.variables.push(Variable::new(name, value));
        self
    }

    /// Look up an output variable by name.
    pub fn variable(&self, name: &str) -> Option<&TypedData> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.value)
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    /// Identity carried by an `allow` verdict.
    pub fn identity(&self) -> Option<&str> {
        self.variable(vars::IDENTITY).and_then(TypedData::as_str)
    }
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<TypedData>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_sets_identity() {
        let v = Verdict::allow("alice");
        assert!(v.is_allowed());
        assert_eq!(v.identity(), Some("alice"));
        assert_eq!(v.variable(vars::AUTHENTICATED), Some(&TypedData::Bool(true)));
    }

    #[test]
    fn test_redirect_carries_target() {
        let v = Verdict::redirect("https://idp/authorize?state=x");
        assert_eq!(v.decision, Decision::Redirect);
        assert_eq!(v.redirect.as_deref(), Some("https://idp/authorize?state=x"));
        assert_eq!(
            v.variable(vars::REDIRECT).and_then(TypedData::as_str),
            Some("https://idp/authorize?state=x")
        );
        assert_eq!(v.variable(vars::AUTHENTICATED), Some(&TypedData::Bool(false)));
    }

    #[test]
    fn test_failure_is_a_deny_with_reason() {
        let v = Verdict::from_failure(&AuthError::Upstream("connection refused".into()));
        assert_eq!(v.decision, Decision::Deny);
        assert_eq!(v.variable(vars::HAS_ERROR), Some(&TypedData::Bool(true)));
        assert_eq!(
            v.variable(vars::ERROR_REASON).and_then(TypedData::as_str),
            Some("upstream_unavailable")
        );
    }
}
