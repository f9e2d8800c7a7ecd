//! engine::error
//!
//! Engine error type and its two kinds.
//!
//! Every failure is either the requester's fault ([`ErrorKind::Validation`],
//! shown verbatim) or ours ([`ErrorKind::Infrastructure`], logged in full
//! and shown only as a generic failure with a truncated message).

use std::path::PathBuf;

use thiserror::Error;

pub use crate::core::validate::ValidationError;
use crate::core::config::ConfigError;
use crate::forge::ForgeError;

/// Longest infrastructure message shown to a requester.
pub const USER_MESSAGE_LIMIT: usize = 300;

/// The two classes of engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Infrastructure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The request itself is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A hosting API call failed.
    #[error("failed to {action}: {source}")]
    Forge {
        action: &'static str,
        #[source]
        source: ForgeError,
    },

    /// A staging-directory operation failed.
    #[error("filesystem error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A template failed to parse or render.
    #[error("failed to render template '{name}': {source}")]
    Template {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// An environment has nothing to render, or rendering it would
    /// overwrite its own sources.
    #[error("cannot render '{path}': {reason}")]
    Render { path: String, reason: &'static str },

    /// The repository snapshot could not be unpacked.
    #[error("failed to extract repository archive: {0}")]
    Archive(String),

    /// Settings the engine was built from are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DeployError {
    /// Which class of failure this is.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Validation(_) => ErrorKind::Validation,
            DeployError::Forge { .. }
            | DeployError::Io { .. }
            | DeployError::Template { .. }
            | DeployError::Render { .. }
            | DeployError::Archive(_)
            | DeployError::Config(_) => ErrorKind::Infrastructure,
        }
    }

    /// The validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            DeployError::Validation(e) => Some(e),
            _ => None,
        }
    }

    /// Message safe to show to the requester.
    ///
    /// ```
    /// use releasegate::engine::{DeployError, ValidationError};
    ///
    /// let err = DeployError::from(ValidationError::NoServices);
    /// assert_eq!(err.user_message(), "Validation error: no services specified");
    /// ```
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation => format!("Validation error: {}", self),
            ErrorKind::Infrastructure => format!(
                "Operation failed: {}",
                truncate(&self.to_string(), USER_MESSAGE_LIMIT)
            ),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attach the failed action to a forge result.
pub(crate) trait ForgeResultExt<T> {
    fn during(self, action: &'static str) -> Result<T, DeployError>;
}

impl<T> ForgeResultExt<T> for Result<T, ForgeError> {
    fn during(self, action: &'static str) -> Result<T, DeployError> {
        self.map_err(|source| DeployError::Forge { action, source })
    }
}

/// Cut `text` to at most `limit` bytes on a character boundary, marking the cut.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
