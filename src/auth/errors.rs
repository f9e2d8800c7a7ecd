//! auth::errors
//!
//! Authentication error types.
//!
//! Error messages never contain token values, only the host or the name of
//! the variable a token was expected in.
//!
//! # Example
//!
//! ```
//! use releasegate::auth::AuthError;
//!
//! let err = AuthError::MissingToken("GITHUB_TOKEN".to_string());
//! assert!(err.to_string().contains("GITHUB_TOKEN"));
//! ```

use thiserror::Error;

/// Errors from authentication operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No authentication exists for the specified host.
    #[error("not authenticated for host '{0}'")]
    NotAuthenticated(String),

    /// The environment variable expected to hold a token is unset or empty.
    #[error("no token found in environment variable '{0}'")]
    MissingToken(String),
}
