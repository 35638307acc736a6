//! Canned authenticators for tests.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::authenticator::{Attributes, Authenticator};
use crate::error::AuthError;
use crate::verdict::Verdict;

/// Always returns the same verdict, optionally after a delay.
#[derive(Debug)]
pub struct StaticAuthenticator {
    verdict: Verdict,
    delay: Option<Duration>,
}

impl StaticAuthenticator {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    fn kind(&self) -> &'static str {
        "static"
    }

    async fn authenticate(&self, _attributes: &Attributes) -> Result<Verdict, AuthError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.verdict.clone())
    }
}

/// Always fails with the given error.
#[derive(Debug)]
pub struct FailingAuthenticator {
    error: AuthError,
}

impl FailingAuthenticator {
    pub fn new(error: AuthError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl Authenticator for FailingAuthenticator {
    fn kind(&self) -> &'static str {
        "failing"
    }

    async fn authenticate(&self, _attributes: &Attributes) -> Result<Verdict, AuthError> {
        Err(self.error.clone())
    }
}

/// Echoes one attribute back as the identity and records every call.
///
/// Allows when the attribute is present, denies otherwise.
#[derive(Debug)]
pub struct EchoAuthenticator {
    attribute: String,
    delay: Option<Duration>,
    calls: Mutex<Vec<Attributes>>,
}

impl EchoAuthenticator {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Attributes> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Authenticator for EchoAuthenticator {
    fn kind(&self) -> &'static str {
        "echo"
    }

    async fn authenticate(&self, attributes: &Attributes) -> Result<Verdict, AuthError> {
        self.calls.lock().push(attributes.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(match attributes.get_str(&self.attribute) {
            Some(value) => Verdict::allow(value),
            None => Verdict::deny(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_echo_records_concurrent_calls() {
        let echo = Arc::new(EchoAuthenticator::new("user").with_delay(Duration::from_millis(5)));
        let handles: Vec<_> = ["alice", "bob", "carol"]
            .into_iter()
            .map(|user| {
                let echo = Arc::clone(&echo);
                tokio::spawn(async move {
                    echo.authenticate(&Attributes::new().with("user", user)).await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_allowed());
        }

        let mut users: Vec<String> = echo
            .calls()
            .iter()
            .filter_map(|attrs| attrs.get_str("user").map(str::to_string))
            .collect();
        users.sort();
        assert_eq!(users, ["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_missing_attribute_denies() {
        let echo = EchoAuthenticator::new("user");
        let verdict = echo.authenticate(&Attributes::new()).await.unwrap();
        assert!(!verdict.is_allowed());
        assert_eq!(echo.calls().len(), 1);
    }
}
