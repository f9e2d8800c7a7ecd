//! engine::command
//!
//! The closed set of engine operations and their results.
//!
//! Front ends build an [`Operation`] and hand it to
//! [`Deployer::execute`](super::Deployer::execute); the dispatch is an
//! exhaustive match, so adding an operation means handling it everywhere.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::freeze::{FreezeAction, FreezeState};
use super::ChangeRequest;
use crate::core::config::{Environment, Service};
use crate::core::types::Identity;
use crate::forge::ResolvedCommit;

/// Release `services` to `environment` at `reference`.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Service names or tags.
    pub services: Vec<String>,
    pub environment: String,
    /// Branch, tag or sha in the services' source repository. When
    /// `commit_url` is set this must already be a full sha.
    pub reference: String,
    /// Link to an already resolved commit; skips resolution.
    pub commit_url: Option<String>,
    pub author: Identity,
}

/// Freeze or unfreeze `services` in `environment`.
#[derive(Debug, Clone)]
pub struct FreezeRequest {
    /// Service names or tags.
    pub services: Vec<String>,
    pub environment: String,
    pub action: FreezeAction,
    pub author: Identity,
}

/// Freeze state of one environment of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    pub environment: String,
    pub frozen: bool,
}

impl EnvironmentStatus {
    pub fn state(&self) -> FreezeState {
        FreezeState::from_frozen(self.frozen)
    }
}

/// Status listing keyed by service name.
pub type StatusReport = BTreeMap<String, Vec<EnvironmentStatus>>;

#[derive(Debug, Clone)]
pub enum Operation {
    ResolveCommit {
        services: Vec<String>,
        reference: String,
    },
    Deploy(DeployRequest),
    Freeze(FreezeRequest),
    Approve {
        number: u64,
    },
    Cancel {
        number: u64,
    },
    ListServices,
    ListEnvironments {
        service: String,
    },
    /// Freeze status of the named services, or of all when empty.
    Status {
        services: Vec<String>,
    },
}

impl Operation {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ResolveCommit { .. } => "resolve-commit",
            Operation::Deploy(_) => "deploy",
            Operation::Freeze(req) => req.action.verb(),
            Operation::Approve { .. } => "approve",
            Operation::Cancel { .. } => "cancel",
            Operation::ListServices => "list-services",
            Operation::ListEnvironments { .. } => "list-environments",
            Operation::Status { .. } => "status",
        }
    }

    /// Whether the operation can write to the deployment repository.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Deploy(_)
                | Operation::Freeze(_)
                | Operation::Approve { .. }
                | Operation::Cancel { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Commit(ResolvedCommit),
    /// A change request was opened and awaits approval.
    Opened(ChangeRequest),
    /// Nothing changed, so no change request was opened.
    Unchanged,
    Approved {
        number: u64,
    },
    Cancelled {
        number: u64,
    },
    Services(Vec<Service>),
    Environments(Vec<Environment>),
    Status(StatusReport),
}
