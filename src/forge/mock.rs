//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! The mock keeps whole repositories in memory: branches, content-addressed
//! commits and trees, pull requests. It serves real zip archives and unified
//! diffs, so the engine can be driven end to end without a network. Every
//! call is recorded for later assertions, and any operation can be made to
//! fail.
//!
//! Squash-merging a PR moves its base branch to a new commit with the head
//! branch's tree.
//!
//! # Example
//!
//! ```
//! use releasegate::core::types::{BranchName, RepoSlug};
//! use releasegate::forge::mock::MockForge;
//! use releasegate::forge::Forge;
//!
//! # tokio_test::block_on(async {
//! let repo = RepoSlug::new("acme", "deployments").unwrap();
//! let forge = MockForge::new().with_repo(&repo, "main", [("README.md", "hello\n")]);
//!
//! let main = BranchName::new("main").unwrap();
//! let branch = forge.get_branch(&repo, &main).await.unwrap();
//! assert_eq!(forge.file(&repo, "main", "README.md").as_deref(), Some("hello\n"));
//! assert_eq!(forge.branch_sha(&repo, "main"), Some(branch.sha));
//! # });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::traits::{
    Branch, CompareStatus, CreatePrRequest, Forge, ForgeError, GitCommit, MergeMethod, NewCommit,
    PrState, PrStateUpdate, PullRequest, Repository, ResolvedCommit, TreeContent, TreeEntry,
    UpdatePrRequest,
};
use crate::core::types::{BranchName, Oid, RepoSlug};

/// Files of a tree: path to content.
type Files = BTreeMap<String, Vec<u8>>;

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockForge {
    inner: Arc<Mutex<MockForgeInner>>,
}

#[derive(Debug, Default)]
struct MockForgeInner {
    repos: HashMap<RepoSlug, RepoState>,
    /// Operations to fail (for testing error paths).
    fail_on: Vec<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<(RepoSlug, MockOperation)>,
    /// Counter mixed into commit ids so identical commits stay distinct.
    sequence: u64,
}

#[derive(Debug)]
struct RepoState {
    default_branch: BranchName,
    branches: BTreeMap<String, Oid>,
    commits: HashMap<Oid, MockCommit>,
    trees: HashMap<Oid, Files>,
    blobs: HashMap<Oid, Vec<u8>>,
    prs: BTreeMap<u64, PullRequest>,
    next_pr_number: u64,
    comparisons: HashMap<(String, String), CompareStatus>,
    aliases: HashMap<String, ResolvedCommit>,
}

#[derive(Debug, Clone)]
struct MockCommit {
    tree: Oid,
    parents: Vec<Oid>,
    message: String,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    GetRepository(ForgeError),
    GetBranch(ForgeError),
    CreateBranch(ForgeError),
    DeleteBranch(ForgeError),
    UpdateBranch(ForgeError),
    DownloadArchive(ForgeError),
    CreateTree(ForgeError),
    CreateCommit(ForgeError),
    GetCommit(ForgeError),
    /// Fail comparisons against this head only.
    CompareCommits { head: String, error: ForgeError },
    CreatePr(ForgeError),
    GetPr(ForgeError),
    MergePr(ForgeError),
    UpdatePr(ForgeError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    GetRepository,
    GetBranch { branch: String },
    CreateBranch { branch: String, sha: Oid },
    DeleteBranch { branch: String },
    UpdateBranch { branch: String, sha: Oid },
    DownloadArchive { reference: String },
    CreateBlob { size: usize },
    CreateTree { paths: Vec<String> },
    GetGitCommit { sha: Oid },
    CreateCommit { message: String },
    GetCommit { reference: String },
    CompareCommits { base: String, head: String },
    CreatePr { head: String, base: String, title: String },
    GetPr { number: u64 },
    MergePr { number: u64, method: MergeMethod },
    UpdatePr { number: u64, state: Option<PrStateUpdate> },
    GetPrDiff { number: u64 },
}

impl MockOperation {
    /// Whether the operation mutates remote state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            MockOperation::CreateBranch { .. }
                | MockOperation::DeleteBranch { .. }
                | MockOperation::UpdateBranch { .. }
                | MockOperation::CreateBlob { .. }
                | MockOperation::CreateTree { .. }
                | MockOperation::CreateCommit { .. }
                | MockOperation::CreatePr { .. }
                | MockOperation::MergePr { .. }
                | MockOperation::UpdatePr { .. }
        )
    }
}

/// Content-addressed id for a mock object.
fn object_id(kind: &str, parts: &[&[u8]]) -> Oid {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    let digest = hex::encode(hasher.finalize());
    // Hex of a sha256 digest is always valid; keep the 40-char form GitHub uses
    Oid::new(&digest[..40]).unwrap_or_else(|_| unreachable!("sha256 hex is a valid oid"))
}

fn tree_id(files: &Files) -> Oid {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(files.len() * 2);
    for (path, content) in files {
        parts.push(path.as_bytes());
        parts.push(content);
    }
    object_id("tree", &parts)
}

impl RepoState {
    fn new(default_branch: BranchName) -> Self {
        Self {
            default_branch,
            branches: BTreeMap::new(),
            commits: HashMap::new(),
            trees: HashMap::new(),
            blobs: HashMap::new(),
            prs: BTreeMap::new(),
            next_pr_number: 1,
            comparisons: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    fn store_tree(&mut self, files: Files) -> Oid {
        let id = tree_id(&files);
        self.trees.entry(id.clone()).or_insert(files);
        id
    }

    fn store_commit(&mut self, sequence: u64, commit: MockCommit) -> Oid {
        let seq = sequence.to_be_bytes();
        let mut parts: Vec<&[u8]> = vec![
            commit.tree.as_str().as_bytes(),
            commit.message.as_bytes(),
            &seq,
        ];
        parts.extend(commit.parents.iter().map(|p| p.as_str().as_bytes()));
        let id = object_id("commit", &parts);
        self.commits.insert(id.clone(), commit);
        id
    }

    fn files_of_commit(&self, sha: &Oid) -> Option<&Files> {
        let commit = self.commits.get(sha)?;
        self.trees.get(&commit.tree)
    }

    fn branch_files(&self, branch: &str) -> Option<&Files> {
        let sha = self.branches.get(branch)?;
        self.files_of_commit(sha)
    }

    /// Resolve a branch name, alias, full sha or unique sha prefix.
    fn resolve(&self, reference: &str) -> Option<Oid> {
        if let Some(sha) = self.branches.get(reference) {
            return Some(sha.clone());
        }
        if let Some(alias) = self.aliases.get(reference) {
            return Some(alias.sha.clone());
        }
        let reference = reference.to_ascii_lowercase();
        if reference.len() < 4 {
            return None;
        }
        let mut matches = self
            .commits
            .keys()
            .filter(|sha| sha.as_str().starts_with(&reference));
        match (matches.next(), matches.next()) {
            (Some(sha), None) => Some(sha.clone()),
            _ => None,
        }
    }
}

impl MockForgeInner {
    /// State of `repo`, created with a `main` default branch if unknown.
    fn repo_entry(&mut self, repo: &RepoSlug) -> &mut RepoState {
        self.repos.entry(repo.clone()).or_insert_with(|| {
            RepoState::new(BranchName::new("main").unwrap_or_else(|_| unreachable!()))
        })
    }
}

impl MockForge {
    /// Create a new empty mock forge.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockForgeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a repository whose default branch holds `files` in one commit.
    pub fn with_repo<P, C>(
        self,
        repo: &RepoSlug,
        default_branch: &str,
        files: impl IntoIterator<Item = (P, C)>,
    ) -> Self
    where
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        let branch = BranchName::new(default_branch)
            .unwrap_or_else(|e| panic!("mock default branch: {e}"));
        self.state()
            .repos
            .insert(repo.clone(), RepoState::new(branch));
        self.with_branch(repo, default_branch, files)
    }

    /// Point `branch` at a new root commit holding exactly `files`.
    pub fn with_branch<P, C>(
        self,
        repo: &RepoSlug,
        branch: &str,
        files: impl IntoIterator<Item = (P, C)>,
    ) -> Self
    where
        P: Into<String>,
        C: Into<Vec<u8>>,
    {
        let files: Files = files
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();
        {
            let mut state = self.state();
            state.sequence += 1;
            let sequence = state.sequence;
            let repo_state = state.repo_entry(repo);
            let tree = repo_state.store_tree(files);
            let sha = repo_state.store_commit(
                sequence,
                MockCommit {
                    tree,
                    parents: vec![],
                    message: format!("initial {}", branch),
                },
            );
            repo_state.branches.insert(branch.to_string(), sha);
        }
        self
    }

    /// Make `reference` resolve to `commit` in `repo` (for source repositories).
    pub fn with_commit(self, repo: &RepoSlug, reference: &str, commit: ResolvedCommit) -> Self {
        {
            let mut state = self.state();
            let repo_state = state.repo_entry(repo);
            repo_state
                .aliases
                .insert(commit.sha.as_str().to_string(), commit.clone());
            repo_state.aliases.insert(reference.to_string(), commit);
        }
        self
    }

    /// Configure the answer to `compare_commits(repo, base, head)`.
    pub fn with_comparison(
        self,
        repo: &RepoSlug,
        base: &str,
        head: &str,
        status: CompareStatus,
    ) -> Self {
        {
            let mut state = self.state();
            let repo_state = state.repo_entry(repo);
            repo_state
                .comparisons
                .insert((base.to_string(), head.to_string()), status);
        }
        self
    }

    /// Add a pre-existing PR.
    pub fn with_pr(self, repo: &RepoSlug, pr: PullRequest) -> Self {
        {
            let mut state = self.state();
            if let Some(repo_state) = state.repos.get_mut(repo) {
                repo_state.next_pr_number = repo_state.next_pr_number.max(pr.number + 1);
                repo_state.prs.insert(pr.number, pr);
            }
        }
        self
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use releasegate::forge::mock::{FailOn, MockForge};
    /// use releasegate::forge::ForgeError;
    ///
    /// let forge = MockForge::new().fail_on(FailOn::CreatePr(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.state().fail_on.push(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.state().fail_on.clear();
    }

    /// Get all recorded operations, across repositories.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.state()
            .operations
            .iter()
            .map(|(_, op)| op.clone())
            .collect()
    }

    /// Get the operations recorded against one repository.
    pub fn operations_on(&self, repo: &RepoSlug) -> Vec<MockOperation> {
        self.state()
            .operations
            .iter()
            .filter(|(r, _)| r == repo)
            .map(|(_, op)| op.clone())
            .collect()
    }

    /// Recorded operations that mutate remote state.
    pub fn writes(&self) -> Vec<MockOperation> {
        self.operations()
            .into_iter()
            .filter(MockOperation::is_write)
            .collect()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Current head of a branch.
    pub fn branch_sha(&self, repo: &RepoSlug, branch: &str) -> Option<Oid> {
        self.state().repos.get(repo)?.branches.get(branch).cloned()
    }

    /// Whether a branch exists.
    pub fn has_branch(&self, repo: &RepoSlug, branch: &str) -> bool {
        self.branch_sha(repo, branch).is_some()
    }

    /// Files at the head of a branch.
    pub fn files(&self, repo: &RepoSlug, branch: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        self.state().repos.get(repo)?.branch_files(branch).cloned()
    }

    /// One file at the head of a branch, as text.
    pub fn file(&self, repo: &RepoSlug, branch: &str, path: &str) -> Option<String> {
        let files = self.files(repo, branch)?;
        files
            .get(path)
            .map(|c| String::from_utf8_lossy(c).into_owned())
    }

    /// Parents of a commit.
    pub fn commit_parents(&self, repo: &RepoSlug, sha: &Oid) -> Vec<Oid> {
        self.state()
            .repos
            .get(repo)
            .and_then(|r| r.commits.get(sha))
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    /// Message of a commit.
    pub fn commit_message(&self, repo: &RepoSlug, sha: &Oid) -> Option<String> {
        self.state()
            .repos
            .get(repo)?
            .commits
            .get(sha)
            .map(|c| c.message.clone())
    }

    /// Get a PR by number (for test verification).
    pub fn get_pr_sync(&self, repo: &RepoSlug, number: u64) -> Option<PullRequest> {
        self.state().repos.get(repo)?.prs.get(&number).cloned()
    }

    /// Get the count of PRs.
    pub fn pr_count(&self, repo: &RepoSlug) -> usize {
        self.state()
            .repos
            .get(repo)
            .map(|r| r.prs.len())
            .unwrap_or(0)
    }

    fn record(&self, repo: &RepoSlug, op: MockOperation) {
        self.state().operations.push((repo.clone(), op));
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, pick: impl Fn(&FailOn) -> Option<&ForgeError>) -> Result<(), ForgeError> {
        let state = self.state();
        match state.fail_on.iter().find_map(|f| pick(f)) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Run `f` against a repository's state.
    fn with_repo_state<T>(
        &self,
        repo: &RepoSlug,
        f: impl FnOnce(&mut RepoState, u64) -> Result<T, ForgeError>,
    ) -> Result<T, ForgeError> {
        let mut state = self.state();
        state.sequence += 1;
        let sequence = state.sequence;
        let repo_state = state
            .repos
            .get_mut(repo)
            .ok_or_else(|| ForgeError::NotFound(format!("repository {}", repo)))?;
        f(repo_state, sequence)
    }
}

fn build_archive(prefix: &str, files: &Files) -> Result<Vec<u8>, ForgeError> {
    let to_err = |e: zip::result::ZipError| ForgeError::InvalidResponse(e.to_string());
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.add_directory(format!("{}/", prefix), options)
            .map_err(to_err)?;
        for (path, content) in files {
            zip.start_file(format!("{}/{}", prefix, path), options)
                .map_err(to_err)?;
            zip.write_all(content)
                .map_err(|e| ForgeError::InvalidResponse(e.to_string()))?;
        }
        zip.finish().map_err(to_err)?;
    }
    Ok(buf.into_inner())
}

fn unified_diff(base: &Files, head: &Files) -> String {
    let mut paths: Vec<&String> = base.keys().chain(head.keys()).collect();
    paths.sort();
    paths.dedup();

    let mut out = String::new();
    for path in paths {
        let old = base.get(path);
        let new = head.get(path);
        if old == new {
            continue;
        }
        let old_text = old.map(|c| String::from_utf8_lossy(c).into_owned()).unwrap_or_default();
        let new_text = new.map(|c| String::from_utf8_lossy(c).into_owned()).unwrap_or_default();
        let old_name = if old.is_some() { format!("a/{}", path) } else { "/dev/null".into() };
        let new_name = if new.is_some() { format!("b/{}", path) } else { "/dev/null".into() };

        out.push_str(&format!("diff --git a/{path} b/{path}\n"));
        out.push_str(
            &similar::TextDiff::from_lines(&old_text, &new_text)
                .unified_diff()
                .context_radius(3)
                .header(&old_name, &new_name)
                .to_string(),
        );
    }
    out
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_repository(&self, repo: &RepoSlug) -> Result<Repository, ForgeError> {
        self.record(repo, MockOperation::GetRepository);
        self.check_fail(|f| match f {
            FailOn::GetRepository(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            Ok(Repository {
                default_branch: state.default_branch.clone(),
                url: format!("https://github.com/{}", repo),
            })
        })
    }

    async fn get_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
    ) -> Result<Branch, ForgeError> {
        self.record(
            repo,
            MockOperation::GetBranch {
                branch: branch.to_string(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::GetBranch(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            let sha = state
                .branches
                .get(branch.as_str())
                .cloned()
                .ok_or_else(|| ForgeError::NotFound(format!("branch {}", branch)))?;
            Ok(Branch {
                name: branch.clone(),
                sha,
            })
        })
    }

    async fn create_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<Branch, ForgeError> {
        self.record(
            repo,
            MockOperation::CreateBranch {
                branch: branch.to_string(),
                sha: sha.clone(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::CreateBranch(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            if state.branches.contains_key(branch.as_str()) {
                return Err(ForgeError::ApiError {
                    status: 422,
                    message: "Reference already exists".into(),
                });
            }
            if !state.commits.contains_key(sha) {
                return Err(ForgeError::ApiError {
                    status: 422,
                    message: "Object does not exist".into(),
                });
            }
            state.branches.insert(branch.to_string(), sha.clone());
            Ok(Branch {
                name: branch.clone(),
                sha: sha.clone(),
            })
        })
    }

    async fn delete_branch(&self, repo: &RepoSlug, branch: &BranchName) -> Result<(), ForgeError> {
        self.record(
            repo,
            MockOperation::DeleteBranch {
                branch: branch.to_string(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::DeleteBranch(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            state
                .branches
                .remove(branch.as_str())
                .map(|_| ())
                .ok_or_else(|| ForgeError::NotFound("Reference does not exist".into()))
        })
    }

    async fn update_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<Branch, ForgeError> {
        self.record(
            repo,
            MockOperation::UpdateBranch {
                branch: branch.to_string(),
                sha: sha.clone(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::UpdateBranch(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            let current = state
                .branches
                .get(branch.as_str())
                .cloned()
                .ok_or_else(|| ForgeError::ApiError {
                    status: 422,
                    message: "Reference does not exist".into(),
                })?;
            let fast_forward = state
                .commits
                .get(sha)
                .map(|c| c.parents.contains(&current) || *sha == current)
                .unwrap_or(false);
            if !fast_forward {
                return Err(ForgeError::ApiError {
                    status: 422,
                    message: "Update is not a fast forward".into(),
                });
            }
            state.branches.insert(branch.to_string(), sha.clone());
            Ok(Branch {
                name: branch.clone(),
                sha: sha.clone(),
            })
        })
    }

    async fn download_archive(
        &self,
        repo: &RepoSlug,
        reference: &str,
    ) -> Result<Vec<u8>, ForgeError> {
        self.record(
            repo,
            MockOperation::DownloadArchive {
                reference: reference.to_string(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::DownloadArchive(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            let sha = state
                .resolve(reference)
                .ok_or_else(|| ForgeError::NotFound(format!("ref {}", reference)))?;
            let files = state.files_of_commit(&sha).cloned().unwrap_or_default();
            build_archive(
                &format!("{}-{}-{}", repo.owner(), repo.name(), sha.short(7)),
                &files,
            )
        })
    }

    async fn create_blob(&self, repo: &RepoSlug, content: &[u8]) -> Result<Oid, ForgeError> {
        self.record(
            repo,
            MockOperation::CreateBlob {
                size: content.len(),
            },
        );

        self.with_repo_state(repo, |state, _| {
            let id = object_id("blob", &[content]);
            state.blobs.insert(id.clone(), content.to_vec());
            Ok(id)
        })
    }

    async fn create_tree(
        &self,
        repo: &RepoSlug,
        base_tree: &Oid,
        entries: &[TreeEntry],
    ) -> Result<Oid, ForgeError> {
        self.record(
            repo,
            MockOperation::CreateTree {
                paths: entries.iter().map(|e| e.path.clone()).collect(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::CreateTree(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            let mut files = state
                .trees
                .get(base_tree)
                .cloned()
                .ok_or_else(|| ForgeError::ApiError {
                    status: 422,
                    message: "base_tree is not a valid tree oid".into(),
                })?;
            for entry in entries {
                match &entry.content {
                    TreeContent::Inline(text) => {
                        files.insert(entry.path.clone(), text.clone().into_bytes());
                    }
                    TreeContent::Blob(oid) => {
                        let blob = state.blobs.get(oid).cloned().ok_or_else(|| {
                            ForgeError::ApiError {
                                status: 422,
                                message: format!("blob {} does not exist", oid),
                            }
                        })?;
                        files.insert(entry.path.clone(), blob);
                    }
                    TreeContent::Delete => {
                        files.remove(&entry.path);
                    }
                }
            }
            Ok(state.store_tree(files))
        })
    }

    async fn get_git_commit(&self, repo: &RepoSlug, sha: &Oid) -> Result<GitCommit, ForgeError> {
        self.record(repo, MockOperation::GetGitCommit { sha: sha.clone() });

        self.with_repo_state(repo, |state, _| {
            let commit = state
                .commits
                .get(sha)
                .ok_or_else(|| ForgeError::NotFound(format!("commit {}", sha)))?;
            Ok(GitCommit {
                sha: sha.clone(),
                tree: commit.tree.clone(),
            })
        })
    }

    async fn create_commit(
        &self,
        repo: &RepoSlug,
        commit: &NewCommit,
    ) -> Result<GitCommit, ForgeError> {
        self.record(
            repo,
            MockOperation::CreateCommit {
                message: commit.message.clone(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::CreateCommit(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, sequence| {
            if !state.trees.contains_key(&commit.tree) {
                return Err(ForgeError::ApiError {
                    status: 422,
                    message: "Tree SHA does not exist".into(),
                });
            }
            let sha = state.store_commit(
                sequence,
                MockCommit {
                    tree: commit.tree.clone(),
                    parents: commit.parents.clone(),
                    message: commit.message.clone(),
                },
            );
            Ok(GitCommit {
                sha,
                tree: commit.tree.clone(),
            })
        })
    }

    async fn get_commit(
        &self,
        repo: &RepoSlug,
        reference: &str,
    ) -> Result<ResolvedCommit, ForgeError> {
        self.record(
            repo,
            MockOperation::GetCommit {
                reference: reference.to_string(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::GetCommit(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            if let Some(alias) = state.aliases.get(reference) {
                return Ok(alias.clone());
            }
            let sha = state.resolve(reference).ok_or_else(|| ForgeError::ApiError {
                status: 422,
                message: format!("No commit found for SHA: {}", reference),
            })?;
            Ok(ResolvedCommit {
                url: format!("https://github.com/{}/commit/{}", repo, sha),
                sha,
            })
        })
    }

    async fn compare_commits(
        &self,
        repo: &RepoSlug,
        base: &str,
        head: &str,
    ) -> Result<CompareStatus, ForgeError> {
        self.record(
            repo,
            MockOperation::CompareCommits {
                base: base.to_string(),
                head: head.to_string(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::CompareCommits { head: h, error } if h == head => Some(error),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            if let Some(status) = state.comparisons.get(&(base.to_string(), head.to_string())) {
                return Ok(*status);
            }
            let base_sha = state.resolve(base);
            let head_sha = state.resolve(head);
            match (base_sha, head_sha) {
                (Some(b), Some(h)) if b == h => Ok(CompareStatus::Identical),
                (Some(_), Some(_)) => Ok(CompareStatus::Diverged),
                _ => Err(ForgeError::NotFound("Not Found".into())),
            }
        })
    }

    async fn create_pr(
        &self,
        repo: &RepoSlug,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError> {
        self.record(
            repo,
            MockOperation::CreatePr {
                head: request.head.clone(),
                base: request.base.clone(),
                title: request.title.clone(),
            },
        );
        self.check_fail(|f| match f {
            FailOn::CreatePr(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            for branch in [&request.head, &request.base] {
                if !state.branches.contains_key(branch.as_str()) {
                    return Err(ForgeError::ApiError {
                        status: 422,
                        message: format!("Validation Failed: unknown branch {}", branch),
                    });
                }
            }
            let number = state.next_pr_number;
            state.next_pr_number += 1;

            let pr = PullRequest {
                number,
                url: format!("https://github.com/{}/pull/{}", repo, number),
                state: PrState::Open,
                head: request.head,
                base: request.base,
                title: request.title,
                body: request.body,
            };
            state.prs.insert(number, pr.clone());
            Ok(pr)
        })
    }

    async fn get_pr(&self, repo: &RepoSlug, number: u64) -> Result<PullRequest, ForgeError> {
        self.record(repo, MockOperation::GetPr { number });
        self.check_fail(|f| match f {
            FailOn::GetPr(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            state
                .prs
                .get(&number)
                .cloned()
                .ok_or_else(|| ForgeError::NotFound(format!("PR #{}", number)))
        })
    }

    async fn merge_pr(
        &self,
        repo: &RepoSlug,
        number: u64,
        method: MergeMethod,
    ) -> Result<(), ForgeError> {
        self.record(repo, MockOperation::MergePr { number, method });
        self.check_fail(|f| match f {
            FailOn::MergePr(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, sequence| {
            let pr = state
                .prs
                .get(&number)
                .cloned()
                .ok_or_else(|| ForgeError::NotFound(format!("PR #{}", number)))?;
            if pr.state != PrState::Open {
                return Err(ForgeError::ApiError {
                    status: 405,
                    message: "Pull Request is not mergeable".into(),
                });
            }
            let head_sha = state
                .branches
                .get(&pr.head)
                .cloned()
                .ok_or_else(|| ForgeError::ApiError {
                    status: 422,
                    message: "Head branch was deleted".into(),
                })?;
            let base_sha = state
                .branches
                .get(&pr.base)
                .cloned()
                .ok_or_else(|| ForgeError::ApiError {
                    status: 422,
                    message: "Base branch was deleted".into(),
                })?;
            let tree = state
                .commits
                .get(&head_sha)
                .map(|c| c.tree.clone())
                .ok_or_else(|| ForgeError::NotFound(format!("commit {}", head_sha)))?;

            let squashed = state.store_commit(
                sequence,
                MockCommit {
                    tree,
                    parents: vec![base_sha],
                    message: format!("{} (#{})", pr.title, number),
                },
            );
            state.branches.insert(pr.base.clone(), squashed);
            if let Some(stored) = state.prs.get_mut(&number) {
                stored.state = PrState::Merged;
            }
            Ok(())
        })
    }

    async fn update_pr(
        &self,
        repo: &RepoSlug,
        request: UpdatePrRequest,
    ) -> Result<PullRequest, ForgeError> {
        self.record(
            repo,
            MockOperation::UpdatePr {
                number: request.number,
                state: request.state,
            },
        );
        self.check_fail(|f| match f {
            FailOn::UpdatePr(e) => Some(e),
            _ => None,
        })?;

        self.with_repo_state(repo, |state, _| {
            let pr = state
                .prs
                .get_mut(&request.number)
                .ok_or_else(|| ForgeError::NotFound(format!("PR #{}", request.number)))?;
            if let Some(title) = request.title {
                pr.title = title;
            }
            if let Some(body) = request.body {
                pr.body = Some(body);
            }
            match (request.state, pr.state) {
                (Some(_), PrState::Merged) => {
                    return Err(ForgeError::ApiError {
                        status: 422,
                        message: "Cannot change the state of a merged pull request".into(),
                    })
                }
                (Some(PrStateUpdate::Closed), _) => pr.state = PrState::Closed,
                (Some(PrStateUpdate::Open), _) => pr.state = PrState::Open,
                (None, _) => {}
            }
            Ok(pr.clone())
        })
    }

    async fn get_pr_diff(&self, repo: &RepoSlug, number: u64) -> Result<String, ForgeError> {
        self.record(repo, MockOperation::GetPrDiff { number });

        self.with_repo_state(repo, |state, _| {
            let pr = state
                .prs
                .get(&number)
                .ok_or_else(|| ForgeError::NotFound(format!("PR #{}", number)))?;
            let empty = Files::new();
            let base = state.branch_files(&pr.base).unwrap_or(&empty);
            let head = state.branch_files(&pr.head).unwrap_or(&empty);
            Ok(unified_diff(base, head))
        })
    }
}
