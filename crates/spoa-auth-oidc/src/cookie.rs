//! `Cookie` header parsing and `Set-Cookie` formatting.

use std::fmt;
use std::time::Duration;

/// Find the value of cookie `name` in a raw `Cookie` header.
///
/// The first occurrence wins, matching browsers' most-specific-path-first
/// ordering.
pub fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().trim_matches('"'))
        .filter(|v| !v.is_empty())
}

/// A `Set-Cookie` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: String,
    /// Seconds; zero removes the cookie.
    pub max_age: u64,
    pub secure: bool,
    pub http_only: bool,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: "/".to_string(),
            max_age: max_age.as_secs(),
            secure: true,
            http_only: true,
        }
    }

    /// A cookie that instructs the browser to drop `name`.
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "", Duration::ZERO)
    }

    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path={}; Max-Age={}",
            self.name, self.value, self.path, self.max_age
        )?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        f.write_str("; SameSite=Lax")
    }
}
