//! auth
//!
//! Bearer tokens for the hosting API.
//!
//! # Components
//!
//! - [`TokenProvider`] - Trait for providing bearer tokens to forge adapters
//! - [`StaticTokenProvider`] - A fixed token (tests, short-lived tokens minted by the caller)
//! - [`EnvTokenProvider`] - Reads a configured environment variable per request
//!
//! Exchanging App credentials for an installation token is the calling
//! layer's job; plug the result in through any [`TokenProvider`].
//!
//! # Security
//!
//! Tokens never appear in logs, error messages or `Debug` output.
//!
//! # Example
//!
//! ```
//! use releasegate::auth::{EnvTokenProvider, TokenProvider};
//! use std::sync::Arc;
//!
//! let provider: Arc<dyn TokenProvider> = Arc::new(EnvTokenProvider::new("GITHUB_TOKEN"));
//! assert_eq!(provider.host(), "github.com");
//! ```

mod errors;
mod provider;

pub use errors::AuthError;
pub use provider::{EnvTokenProvider, StaticTokenProvider};

/// Host assumed when none is configured.
pub const DEFAULT_HOST: &str = "github.com";

/// Trait for providing bearer tokens to forge adapters.
///
/// Implementors must never log or expose token values.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a valid bearer token.
    ///
    /// Called once per API request, so implementations may refresh or
    /// re-read their source.
    async fn bearer_token(&self) -> Result<String, AuthError>;

    /// Check if a token is available without fetching it.
    fn is_authenticated(&self) -> bool;

    /// Get the host this provider authenticates for.
    fn host(&self) -> &str;
}
