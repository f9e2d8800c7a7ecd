//! engine::transaction
//!
//! Multi-file commits built remotely from a workspace.
//!
//! # Protocol
//!
//! 1. One tree entry per changed path, read from the staging directory:
//!    UTF-8 text inline, anything else as an uploaded blob, a missing file as
//!    a deletion.
//! 2. The working branch's tracked head is the only parent; its tree is the
//!    base tree.
//! 3. Create tree, create commit, then fast-forward the branch. A rejected
//!    fast-forward means someone else moved the branch and surfaces as an
//!    infrastructure error.
//!
//! The workspace head advances after each commit, so repeated calls build a
//! linear history.

use tracing::debug;

use super::error::{DeployError, ForgeResultExt, ValidationError};
use super::workspace::Workspace;
use crate::core::types::{Identity, Oid, UtcTimestamp};
use crate::forge::{Forge, NewCommit, Signature, TreeContent, TreeEntry};

/// Result of [`commit_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub sha: Oid,
    /// False when the new tree equals the parent's.
    pub tree_changed: bool,
}

/// Commit `paths` (relative to the workspace root) onto the working branch.
///
/// # Errors
///
/// `InvalidBranch` for a read-only snapshot; infrastructure errors from the
/// forge or from reading the staging directory.
pub async fn commit_files(
    forge: &dyn Forge,
    workspace: &mut Workspace,
    paths: &[String],
    author: &Identity,
    committer: &Identity,
    message: &str,
) -> Result<CommitOutcome, DeployError> {
    let branch = workspace
        .working_branch()
        .cloned()
        .ok_or_else(|| ValidationError::InvalidBranch("workspace has no working branch".into()))?;
    let repo = workspace.repo().clone();

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let full = workspace.root().join(path);
        let content = match std::fs::read(&full) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => TreeContent::Inline(text),
                Err(e) => {
                    let sha = forge
                        .create_blob(&repo, e.as_bytes())
                        .await
                        .during("upload blob")?;
                    TreeContent::Blob(sha)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TreeContent::Delete,
            Err(e) => return Err(DeployError::io(full, e)),
        };
        entries.push(TreeEntry {
            path: path.clone(),
            content,
        });
    }

    let parent = forge
        .get_git_commit(&repo, workspace.head())
        .await
        .during("read parent commit")?;

    let tree = forge
        .create_tree(&repo, &parent.tree, &entries)
        .await
        .during("create tree")?;

    let now = UtcTimestamp::now();
    let commit = forge
        .create_commit(
            &repo,
            &NewCommit {
                message: message.to_string(),
                tree: tree.clone(),
                parents: vec![parent.sha.clone()],
                author: Signature {
                    identity: author.clone(),
                    date: now,
                },
                committer: Signature {
                    identity: committer.clone(),
                    date: now,
                },
            },
        )
        .await
        .during("create commit")?;

    forge
        .update_branch(&repo, &branch, &commit.sha)
        .await
        .during("update working branch")?;

    let tree_changed = tree != parent.tree;
    debug!(
        branch = %branch,
        sha = %commit.sha.short(7),
        files = entries.len(),
        tree_changed,
        "committed"
    );

    workspace.advance(commit.sha.clone());
    Ok(CommitOutcome {
        sha: commit.sha,
        tree_changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BranchName, RepoSlug};
    use crate::forge::mock::{FailOn, MockForge, MockOperation};
    use crate::forge::ForgeError;

    fn repo() -> RepoSlug {
        RepoSlug::new("acme", "deployments").unwrap()
    }

    fn work() -> BranchName {
        BranchName::new("releasegate/deploy-payments-prod").unwrap()
    }

    fn author() -> Identity {
        Identity::new("Dana Ops", "dana@example.com")
    }

    fn committer() -> Identity {
        Identity::new("Release Gate", "bot@example.com")
    }

    async fn open(forge: &MockForge, scratch: &std::path::Path) -> Workspace {
        Workspace::open(
            forge,
            &repo(),
            &BranchName::new("main").unwrap(),
            None,
            &work(),
            scratch,
        )
        .await
        .unwrap()
    }

    fn forge() -> MockForge {
        MockForge::new().with_repo(
            &repo(),
            "main",
            [("keep.txt", "keep\n"), ("old.yaml", "old\n")],
        )
    }

    #[tokio::test]
    async fn commits_inline_and_deletions() {
        let forge = forge();
        let scratch = tempfile::TempDir::new().unwrap();
        let mut ws = open(&forge, scratch.path()).await;

        std::fs::write(ws.root().join("new.yaml"), "new\n").unwrap();
        std::fs::remove_file(ws.root().join("old.yaml")).unwrap();

        let outcome = commit_files(
            &forge,
            &mut ws,
            &["new.yaml".to_string(), "old.yaml".to_string()],
            &author(),
            &committer(),
            "update",
        )
        .await
        .unwrap();

        assert!(outcome.tree_changed);
        assert_eq!(ws.head(), &outcome.sha);
        let branch = work();
        assert_eq!(forge.branch_sha(&repo(), branch.as_str()), Some(outcome.sha.clone()));
        assert_eq!(forge.file(&repo(), branch.as_str(), "new.yaml").as_deref(), Some("new\n"));
        assert_eq!(forge.file(&repo(), branch.as_str(), "old.yaml"), None);
        assert_eq!(forge.file(&repo(), branch.as_str(), "keep.txt").as_deref(), Some("keep\n"));
        assert_eq!(forge.commit_message(&repo(), &outcome.sha).as_deref(), Some("update"));
    }

    #[tokio::test]
    async fn binary_content_goes_through_blob() {
        let forge = forge();
        let scratch = tempfile::TempDir::new().unwrap();
        let mut ws = open(&forge, scratch.path()).await;

        std::fs::write(ws.root().join("logo.bin"), [0xff_u8, 0xfe, 0x00, 0x01]).unwrap();
        commit_files(&forge, &mut ws, &["logo.bin".to_string()], &author(), &committer(), "bin")
            .await
            .unwrap();

        assert!(forge
            .operations()
            .iter()
            .any(|op| matches!(op, MockOperation::CreateBlob { size: 4 })));
        let files = forge.files(&repo(), work().as_str()).unwrap();
        assert_eq!(files.get("logo.bin"), Some(&vec![0xff, 0xfe, 0x00, 0x01]));
    }

    #[tokio::test]
    async fn sequential_commits_chain() {
        let forge = forge();
        let scratch = tempfile::TempDir::new().unwrap();
        let mut ws = open(&forge, scratch.path()).await;
        let base = ws.base_sha().clone();

        std::fs::write(ws.root().join("a.txt"), "a").unwrap();
        let first = commit_files(&forge, &mut ws, &["a.txt".to_string()], &author(), &committer(), "a")
            .await
            .unwrap();
        std::fs::write(ws.root().join("b.txt"), "b").unwrap();
        let second = commit_files(&forge, &mut ws, &["b.txt".to_string()], &author(), &committer(), "b")
            .await
            .unwrap();

        assert_eq!(forge.commit_parents(&repo(), &first.sha), vec![base]);
        assert_eq!(forge.commit_parents(&repo(), &second.sha), vec![first.sha]);
    }

    #[tokio::test]
    async fn unchanged_content_reports_same_tree() {
        let forge = forge();
        let scratch = tempfile::TempDir::new().unwrap();
        let mut ws = open(&forge, scratch.path()).await;

        let outcome = commit_files(
            &forge,
            &mut ws,
            &["keep.txt".to_string()],
            &author(),
            &committer(),
            "noop",
        )
        .await
        .unwrap();
        assert!(!outcome.tree_changed);
    }

    #[tokio::test]
    async fn moved_branch_is_rejected() {
        let forge = forge();
        let scratch = tempfile::TempDir::new().unwrap();
        let mut ws = open(&forge, scratch.path()).await;

        // Another writer resets the branch under us.
        let _ = forge.clone().with_branch(&repo(), work().as_str(), [("x", "y")]);

        std::fs::write(ws.root().join("a.txt"), "a").unwrap();
        let err = commit_files(&forge, &mut ws, &["a.txt".to_string()], &author(), &committer(), "a")
            .await
            .unwrap_err();
        assert!(err.as_validation().is_none());
    }

    #[tokio::test]
    async fn tree_failure_stops_before_commit() {
        let forge = forge().fail_on(FailOn::CreateTree(ForgeError::NetworkError("x".into())));
        let scratch = tempfile::TempDir::new().unwrap();
        let mut ws = open(&forge, scratch.path()).await;

        std::fs::write(ws.root().join("a.txt"), "a").unwrap();
        assert!(commit_files(&forge, &mut ws, &["a.txt".to_string()], &author(), &committer(), "a")
            .await
            .is_err());
        assert!(!forge
            .operations()
            .iter()
            .any(|op| matches!(op, MockOperation::CreateCommit { .. })));
    }

    #[tokio::test]
    async fn snapshot_cannot_commit() {
        let forge = forge();
        let scratch = tempfile::TempDir::new().unwrap();
        let mut ws = Workspace::snapshot(
            &forge,
            &repo(),
            &BranchName::new("main").unwrap(),
            None,
            scratch.path(),
        )
        .await
        .unwrap();

        let err = commit_files(&forge, &mut ws, &[], &author(), &committer(), "x")
            .await
            .unwrap_err();
        assert!(err.as_validation().is_some());
    }
}
