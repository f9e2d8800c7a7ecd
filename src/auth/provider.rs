//! auth::provider
//!
//! Token providers for the hosting API.
//!
//! The engine only needs a bearer token per request. Where that token comes
//! from (a personal token, an App installation exchange run by the calling
//! layer) is hidden behind [`TokenProvider`].

use super::{AuthError, TokenProvider, DEFAULT_HOST};

/// A token fixed at construction.
pub struct StaticTokenProvider {
    token: String,
    host: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            host: DEFAULT_HOST.to_string(),
        }
    }

    /// Set the host this token authenticates for (GitHub Enterprise).
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("host", &self.host)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::NotAuthenticated(self.host.clone()));
        }
        Ok(self.token.clone())
    }

    fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Reads the token from an environment variable on every call, so a token
/// rotated by a sidecar is picked up without restarting.
#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
    var: String,
    host: String,
}

impl EnvTokenProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            host: DEFAULT_HOST.to_string(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Name of the variable read.
    pub fn var(&self) -> &str {
        &self.var
    }

    fn read(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[async_trait::async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        self.read()
            .ok_or_else(|| AuthError::MissingToken(self.var.clone()))
    }

    fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    fn host(&self) -> &str {
        &self.host
    }
}
