//! Action-name → authenticator routing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::authenticator::{Attributes, SharedAuthenticator};
use crate::error::RouterError;
use crate::verdict::Verdict;

/// Collects registrations at startup.
///
/// Call [`RouterBuilder::build`] once every authenticator is registered; the
/// resulting router cannot be modified.
#[derive(Debug, Default)]
pub struct RouterBuilder {
    authenticators: HashMap<String, SharedAuthenticator>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticator under `action`.
    ///
    /// Registering the same name twice fails with [`RouterError::DuplicateAction`].
    pub fn register(
        &mut self,
        action: impl Into<String>,
        authenticator: SharedAuthenticator,
    ) -> Result<&mut Self, RouterError> {
        let action = action.into();
        if self.authenticators.contains_key(&action) {
            return Err(RouterError::DuplicateAction(action));
        }
        tracing::debug!(action = %action, kind = authenticator.kind(), "Registered authenticator");
        self.authenticators.insert(action, authenticator);
        Ok(self)
    }

    /// Freeze the registrations.
    pub fn build(self) -> AuthenticatorRouter {
        AuthenticatorRouter {
            authenticators: Arc::new(self.authenticators),
        }
    }
}

/// Immutable mapping from action name to authenticator.
///
/// Cloning is cheap and clones share the same map, so the router can be
/// handed to every connection task without locking.
#[derive(Debug, Clone)]
pub struct AuthenticatorRouter {
    authenticators: Arc<HashMap<String, SharedAuthenticator>>,
}

impl AuthenticatorRouter {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Evaluate `attributes` with the authenticator bound to `action`.
    pub async fn dispatch(
        &self,
        action: &str,
        attributes: &Attributes,
    ) -> Result<Verdict, RouterError> {
        let authenticator = self
            .authenticators
            .get(action)
            .ok_or_else(|| RouterError::UnknownAction(action.to_string()))?;

        authenticator
            .authenticate(attributes)
            .await
            .map_err(|source| RouterError::Authenticator {
                action: action.to_string(),
                source,
            })
    }

    pub fn contains(&self, action: &str) -> bool {
        self.authenticators.contains_key(action)
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.authenticators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.authenticators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::testing::{FailingAuthenticator, StaticAuthenticator};

    #[test]
    fn test_duplicate_action_rejected() {
        let mut builder = AuthenticatorRouter::builder();
        builder
            .register("try-auth", Arc::new(StaticAuthenticator::new(Verdict::deny())))
            .unwrap();

        let err = builder
            .register("try-auth", Arc::new(StaticAuthenticator::new(Verdict::deny())))
            .unwrap_err();
        assert!(matches!(err, RouterError::DuplicateAction(name) if name == "try-auth"));
    }

    #[tokio::test]
    async fn test_dispatch_delegates_verdict_unchanged() {
        let verdict = Verdict::allow("alice").with_variable("extra", 42u32);
        let mut builder = AuthenticatorRouter::builder();
        builder
            .register("a", Arc::new(StaticAuthenticator::new(verdict.clone())))
            .unwrap()
            .register("b", Arc::new(StaticAuthenticator::new(Verdict::deny())))
            .unwrap();
        let router = builder.build();

        let got = router.dispatch("a", &Attributes::new()).await.unwrap();
        assert_eq!(got, verdict);
        assert_eq!(router.actions(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_action() {
        let router = AuthenticatorRouter::builder().build();
        let err = router.dispatch("nope", &Attributes::new()).await.unwrap_err();
        assert!(matches!(err, RouterError::UnknownAction(name) if name == "nope"));
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_propagates_failure() {
        let mut builder = AuthenticatorRouter::builder();
        builder
            .register(
                "ldap",
                Arc::new(FailingAuthenticator::new(AuthError::Upstream("down".into()))),
            )
            .unwrap();
        let router = builder.build();

        let err = router.dispatch("ldap", &Attributes::new()).await.unwrap_err();
        match err {
            RouterError::Authenticator { action, source } => {
                assert_eq!(action, "ldap");
                assert!(matches!(source, AuthError::Upstream(msg) if msg == "down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_shares_router() {
        let mut builder = AuthenticatorRouter::builder();
        builder
            .register("a", Arc::new(StaticAuthenticator::new(Verdict::allow("x"))))
            .unwrap();
        let router = builder.build();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move { router.dispatch("a", &Attributes::new()).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_allowed());
        }
    }
}
