//! engine
//!
//! Deployment orchestration and the remote Git transaction engine.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! - [`resolver`] - Commit resolution and allowed-branch checks
//! - [`workspace`] - Archive snapshot of a deployment branch
//! - [`render`] - Template rendering into generated directories
//! - [`freeze`] - Freeze marker state machine
//! - [`transaction`] - Multi-file commits through blob/tree/commit/ref calls
//! - [`approval`] - Opening, merging and closing change requests
//! - [`deployer`] - The public surface tying the above together
//! - [`command`] - Closed set of operations for front ends
//!
//! Service lookup and consistency checks live in [`crate::core`].
//!
//! # Invariants
//!
//! - No local git and no persistent clone; every write is a forge call
//! - A working branch is always recreated from its base before use
//! - Requests that fail validation make no remote writes
//! - Every public operation runs inside the caller's [`Context`] span
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use releasegate::engine::{Context, Deployer, DeployRequest};
//!
//! let deployer = Deployer::connect(&config.settings, forge).await?;
//! let ctx = Context::new("dana");
//! let change = deployer.deploy(&ctx, DeployRequest { /* ... */ }).await?;
//! println!("approve with: releasegate approve {}", change.number);
//! ```

pub mod approval;
pub mod command;
pub mod deployer;
mod error;
pub mod freeze;
pub mod render;
pub mod resolver;
pub mod transaction;
pub mod workspace;

pub use command::{
    DeployRequest, EnvironmentStatus, FreezeRequest, Operation, Outcome, StatusReport,
};
pub use deployer::Deployer;
pub use error::{truncate, DeployError, ErrorKind, ValidationError, USER_MESSAGE_LIMIT};
pub use freeze::{FreezeAction, FreezeState};

use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

/// Per-request context: identity of the request and the span every log line
/// of the operation is recorded under.
#[derive(Debug, Clone)]
pub struct Context {
    pub request_id: Uuid,
    pub requester: String,
    span: Span,
}

impl Context {
    pub fn new(requester: impl Into<String>) -> Self {
        let request_id = Uuid::new_v4();
        let requester = requester.into();
        let span = tracing::info_span!("request", %request_id, requester = %requester);
        Self {
            request_id,
            requester,
            span,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// What a change request does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Deploy,
    Freeze,
    Unfreeze,
}

impl From<FreezeAction> for ChangeKind {
    fn from(action: FreezeAction) -> Self {
        match action {
            FreezeAction::Freeze => ChangeKind::Freeze,
            FreezeAction::Unfreeze => ChangeKind::Unfreeze,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Deploy => write!(f, "deploy"),
            ChangeKind::Freeze => write!(f, "freeze"),
            ChangeKind::Unfreeze => write!(f, "unfreeze"),
        }
    }
}

/// An open change request awaiting approval.
///
/// `number` is the only handle needed later; the rest is for display and can
/// be persisted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub kind: ChangeKind,
    pub services: Vec<String>,
    pub environment: String,
    pub branch: String,
    pub base_branch: String,
    pub number: u64,
    pub url: String,
    pub diff: String,
}
