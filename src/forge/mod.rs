//! forge
//!
//! Abstraction for the remote Git hosting service.
//!
//! # Architecture
//!
//! The `Forge` trait is the engine's only way to touch a repository: there is
//! no local clone and no git binary. The engine holds an `Arc<dyn Forge>`,
//! so production code runs against [`github::GitHubForge`] and tests against
//! [`mock::MockForge`] without any other difference.
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`github`]: GitHub implementation using the REST API
//! - [`mock`]: In-memory implementation for deterministic testing
//!
//! # Example
//!
//! ```ignore
//! use releasegate::auth::EnvTokenProvider;
//! use releasegate::forge::{github::GitHubForge, Forge};
//! use std::sync::Arc;
//!
//! let forge: Arc<dyn Forge> =
//!     Arc::new(GitHubForge::new(Arc::new(EnvTokenProvider::new("GITHUB_TOKEN"))));
//! let pr = forge.get_pr(&repo, 42).await?;
//! println!("PR #{} is {}", pr.number, pr.state);
//! ```

pub mod github;
pub mod mock;
mod traits;

pub use traits::*;
