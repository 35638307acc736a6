//! The authenticator capability interface.
//!
//! Concrete authenticators live in their own crates (`spoa-auth-oidc`,
//! `spoa-auth-ldap`); the trait is defined here so the protocol engine can
//! dispatch to them without depending on either.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::value::TypedData;
use crate::verdict::Verdict;

/// Request attributes sent by the proxy for one message.
///
/// Keeps the wire order; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    items: Vec<(String, TypedData)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute (builder style).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<TypedData>) -> Self {
        self.items.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypedData> {
        self.items.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// String attribute; empty strings count as absent.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(TypedData::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(TypedData::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedData)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_inner(self) -> Vec<(String, TypedData)> {
        self.items
    }
}

impl From<Vec<(String, TypedData)>> for Attributes {
    fn from(items: Vec<(String, TypedData)>) -> Self {
        Self { items }
    }
}

/// Evaluates request attributes into a [`Verdict`].
///
/// Implementations must be cheap to share: one instance serves every
/// connection and every in-flight request concurrently.
#[async_trait]
pub trait Authenticator: Send + Sync + std::fmt::Debug {
    /// Short name of the mechanism, used in logs ("oidc", "ldap").
    fn kind(&self) -> &'static str;

    /// Evaluate one message.
    ///
    /// Wrong or missing credentials yield `Ok` with a `deny`/`redirect`
    /// verdict. `Err` is reserved for failures that prevented evaluation.
    async fn authenticate(&self, attributes: &Attributes) -> Result<Verdict, AuthError>;
}

/// Shared authenticator handle.
pub type SharedAuthenticator = Arc<dyn Authenticator>;
