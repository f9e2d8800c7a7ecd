//! forge::traits
//!
//! Forge trait definition for interacting with the remote hosting service.
//!
//! # Design
//!
//! The engine never runs git locally. Everything it does to a repository goes
//! through the primitives below: refs, an archive snapshot, blob/tree/commit
//! objects, commit resolution and comparison, and pull requests.
//!
//! Every method names the repository it acts on, because one operation reads
//! the service's source repository (to resolve a commit) and writes the
//! deployment repository.
//!
//! # Example
//!
//! ```ignore
//! use releasegate::forge::{Forge, ForgeError};
//! use releasegate::core::types::{BranchName, RepoSlug};
//!
//! async fn head_of(forge: &dyn Forge, repo: &RepoSlug) -> Result<(), ForgeError> {
//!     let main = BranchName::new("main").unwrap();
//!     let branch = forge.get_branch(repo, &main).await?;
//!     println!("{} is at {}", branch.name, branch.sha.short(7));
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{BranchName, Identity, Oid, RepoSlug, UtcTimestamp};

/// Errors from forge operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForgeError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The API answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl ForgeError {
    /// Whether the resource is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ForgeError::NotFound(_))
    }

    /// Whether the API rejected the input as unprocessable (HTTP 422).
    pub fn is_unprocessable(&self) -> bool {
        matches!(self, ForgeError::ApiError { status: 422, .. })
    }
}

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Branch used when none is specified
    pub default_branch: BranchName,
    /// Web URL
    pub url: String,
}

/// A branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: BranchName,
    pub sha: Oid,
}

/// How a path changes in a new tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeContent {
    /// UTF-8 file content sent inline
    Inline(String),
    /// Content previously uploaded with `create_blob`
    Blob(Oid),
    /// Remove the path from the tree
    Delete,
}

/// One entry of a tree update. Always a regular, non-executable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub content: TreeContent,
}

/// File mode of every entry written.
pub const FILE_MODE: &str = "100644";

/// A commit object: its id and its tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: Oid,
    pub tree: Oid,
}

/// Identity plus timestamp recorded on a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub identity: Identity,
    pub date: UtcTimestamp,
}

/// Request to create a commit object.
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub message: String,
    pub tree: Oid,
    pub parents: Vec<Oid>,
    /// Who asked for the change
    pub author: Signature,
    /// Who wrote the commit (the service identity)
    pub committer: Signature,
}

/// A user reference resolved to a full commit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    pub sha: Oid,
    /// Web URL of the commit
    pub url: String,
}

/// Relationship of `head` to `base` in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareStatus {
    /// `head` contains `base` plus more commits
    Ahead,
    /// `base` contains `head` plus more commits
    Behind,
    Identical,
    Diverged,
}

impl CompareStatus {
    /// Parse the API's status word.
    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "ahead" => Some(Self::Ahead),
            "behind" => Some(Self::Behind),
            "identical" => Some(Self::Identical),
            "diverged" => Some(Self::Diverged),
            _ => None,
        }
    }

    /// Whether `head` contains `base`.
    pub fn contains_base(self) -> bool {
        matches!(self, Self::Ahead | Self::Identical)
    }
}

/// Request to create a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    /// Head branch name (the branch with changes)
    pub head: String,
    /// Base branch name (the branch to merge into)
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body/description
    pub body: Option<String>,
}

/// State a PR can be moved to through an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrStateUpdate {
    Open,
    Closed,
}

impl std::fmt::Display for PrStateUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrStateUpdate::Open => write!(f, "open"),
            PrStateUpdate::Closed => write!(f, "closed"),
        }
    }
}

/// Request to update a pull request.
#[derive(Debug, Clone, Default)]
pub struct UpdatePrRequest {
    /// PR number
    pub number: u64,
    /// New title (if changing)
    pub title: Option<String>,
    /// New body (if changing)
    pub body: Option<String>,
    /// New state (if changing)
    pub state: Option<PrStateUpdate>,
}

/// Pull request information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// PR URL (web URL for viewing)
    pub url: String,
    /// PR state (open, closed, merged)
    pub state: PrState,
    /// Head branch name
    pub head: String,
    /// Base branch name
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body
    pub body: Option<String>,
}

/// PR state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    /// PR is open and awaiting review/merge
    Open,
    /// PR is closed without being merged
    Closed,
    /// PR has been merged
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
            PrState::Merged => write!(f, "merged"),
        }
    }
}

/// Merge method for merging a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMethod {
    /// Create a merge commit
    Merge,
    /// Squash all commits and merge
    #[default]
    Squash,
    /// Rebase commits onto base branch
    Rebase,
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeMethod::Merge => write!(f, "merge"),
            MergeMethod::Squash => write!(f, "squash"),
            MergeMethod::Rebase => write!(f, "rebase"),
        }
    }
}

/// The Forge trait for interacting with the remote hosting service.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one forge is shared by every
/// concurrent operation.
///
/// # Error Handling
///
/// All methods return `Result<T, ForgeError>`. Absence is always reported as
/// `NotFound` so callers can treat it as a normal outcome where it is one
/// (deleting a branch that is already gone).
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github").
    fn name(&self) -> &'static str;

    /// Repository metadata, including the default branch.
    async fn get_repository(&self, repo: &RepoSlug) -> Result<Repository, ForgeError>;

    /// Current head of a branch. `NotFound` if it does not exist.
    async fn get_branch(&self, repo: &RepoSlug, branch: &BranchName)
        -> Result<Branch, ForgeError>;

    /// Create a branch pointing at `sha`.
    async fn create_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<Branch, ForgeError>;

    /// Delete a branch. `NotFound` if it does not exist.
    async fn delete_branch(&self, repo: &RepoSlug, branch: &BranchName) -> Result<(), ForgeError>;

    /// Move a branch to `sha`. Never forced: a non-fast-forward is rejected.
    async fn update_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<Branch, ForgeError>;

    /// Zip archive of the tree at `reference`. Entries are wrapped in a
    /// single top-level folder.
    async fn download_archive(&self, repo: &RepoSlug, reference: &str)
        -> Result<Vec<u8>, ForgeError>;

    /// Upload binary content, returning the blob id.
    async fn create_blob(&self, repo: &RepoSlug, content: &[u8]) -> Result<Oid, ForgeError>;

    /// Create a tree from `base_tree` plus `entries`, returning the tree id.
    async fn create_tree(
        &self,
        repo: &RepoSlug,
        base_tree: &Oid,
        entries: &[TreeEntry],
    ) -> Result<Oid, ForgeError>;

    /// Read a commit object.
    async fn get_git_commit(&self, repo: &RepoSlug, sha: &Oid) -> Result<GitCommit, ForgeError>;

    /// Create a commit object (does not move any ref).
    async fn create_commit(&self, repo: &RepoSlug, commit: &NewCommit)
        -> Result<GitCommit, ForgeError>;

    /// Resolve a branch, tag or (short) sha to a full commit id.
    async fn get_commit(&self, repo: &RepoSlug, reference: &str)
        -> Result<ResolvedCommit, ForgeError>;

    /// Compare `base...head`.
    async fn compare_commits(
        &self,
        repo: &RepoSlug,
        base: &str,
        head: &str,
    ) -> Result<CompareStatus, ForgeError>;

    /// Create a new pull request.
    async fn create_pr(
        &self,
        repo: &RepoSlug,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError>;

    /// Get a pull request by number.
    async fn get_pr(&self, repo: &RepoSlug, number: u64) -> Result<PullRequest, ForgeError>;

    /// Merge a pull request.
    async fn merge_pr(
        &self,
        repo: &RepoSlug,
        number: u64,
        method: MergeMethod,
    ) -> Result<(), ForgeError>;

    /// Update an existing pull request.
    async fn update_pr(
        &self,
        repo: &RepoSlug,
        request: UpdatePrRequest,
    ) -> Result<PullRequest, ForgeError>;

    /// Unified diff of a pull request.
    async fn get_pr_diff(&self, repo: &RepoSlug, number: u64) -> Result<String, ForgeError>;
}
