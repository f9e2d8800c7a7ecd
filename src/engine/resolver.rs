//! engine::resolver
//!
//! Commit resolution and allowed-branch checks against a service's source
//! repository.

use tracing::debug;

use super::error::{DeployError, ForgeResultExt, ValidationError};
use crate::core::types::RepoSlug;
use crate::forge::{Forge, ResolvedCommit};

/// Resolve a branch, tag or (short) sha in `repo`.
///
/// # Errors
///
/// `UnknownCommit` when the forge does not know the reference (404 or 422),
/// an infrastructure error for anything else.
pub async fn get_commit_sha(
    forge: &dyn Forge,
    repo: &RepoSlug,
    reference: &str,
) -> Result<ResolvedCommit, DeployError> {
    let reference = reference.trim();
    let unknown = || ValidationError::UnknownCommit {
        repo: repo.to_string(),
        reference: reference.to_string(),
    };
    if reference.is_empty() {
        return Err(unknown().into());
    }

    match forge.get_commit(repo, reference).await {
        Ok(commit) => {
            debug!(%repo, reference, sha = %commit.sha.short(7), "resolved commit");
            Ok(commit)
        }
        Err(e) if e.is_not_found() || e.is_unprocessable() => Err(unknown().into()),
        Err(e) => Err(e).during("resolve commit"),
    }
}

/// Whether `commit` is contained in any of `branches`.
///
/// Each branch is compared with the commit as base; `ahead` or `identical`
/// means the branch contains it. A branch the forge cannot find counts as no
/// match.
pub async fn validate_branch(
    forge: &dyn Forge,
    repo: &RepoSlug,
    commit: &str,
    branches: &[&str],
) -> Result<bool, DeployError> {
    for branch in branches {
        match forge.compare_commits(repo, commit, branch).await {
            Ok(status) if status.contains_base() => {
                debug!(%repo, commit, branch, ?status, "commit found in branch");
                return Ok(true);
            }
            Ok(status) => debug!(%repo, commit, branch, ?status, "commit not in branch"),
            Err(e) if e.is_not_found() => debug!(%repo, commit, branch, "branch not found"),
            Err(e) => return Err(e).during("compare commits"),
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Oid;
    use crate::forge::mock::{FailOn, MockForge};
    use crate::forge::{CompareStatus, ForgeError};

    const SHA: &str = "1111111111111111111111111111111111111111";

    fn repo() -> RepoSlug {
        RepoSlug::new("acme", "payments").unwrap()
    }

    fn resolved() -> ResolvedCommit {
        ResolvedCommit {
            sha: Oid::new(SHA).unwrap(),
            url: format!("https://github.com/acme/payments/commit/{}", SHA),
        }
    }

    mod get_commit_sha {
        use super::*;

        #[tokio::test]
        async fn resolves_alias() {
            let forge = MockForge::new().with_commit(&repo(), "v1.2.0", resolved());
            let commit = get_commit_sha(&forge, &repo(), "v1.2.0").await.unwrap();
            assert_eq!(commit, resolved());
        }

        #[tokio::test]
        async fn unknown_reference_is_validation() {
            let forge = MockForge::new().with_repo(&repo(), "main", [("a", "b")]);
            let err = get_commit_sha(&forge, &repo(), "deadbeef").await.unwrap_err();
            assert_eq!(
                err.as_validation(),
                Some(&ValidationError::UnknownCommit {
                    repo: "acme/payments".to_string(),
                    reference: "deadbeef".to_string()
                })
            );
        }

        #[tokio::test]
        async fn empty_reference_skips_forge() {
            let forge = MockForge::new();
            let err = get_commit_sha(&forge, &repo(), "  ").await.unwrap_err();
            assert!(err.as_validation().is_some());
            assert!(forge.operations().is_empty());
        }

        #[tokio::test]
        async fn network_error_is_infrastructure() {
            let forge = MockForge::new()
                .fail_on(FailOn::GetCommit(ForgeError::NetworkError("down".into())));
            let err = get_commit_sha(&forge, &repo(), "main").await.unwrap_err();
            assert!(err.as_validation().is_none());
        }
    }

    mod validate_branch {
        use super::*;

        #[tokio::test]
        async fn ahead_matches() {
            let forge =
                MockForge::new().with_comparison(&repo(), SHA, "main", CompareStatus::Ahead);
            assert!(validate_branch(&forge, &repo(), SHA, &["main"]).await.unwrap());
        }

        #[tokio::test]
        async fn identical_matches() {
            let forge =
                MockForge::new().with_comparison(&repo(), SHA, "main", CompareStatus::Identical);
            assert!(validate_branch(&forge, &repo(), SHA, &["main"]).await.unwrap());
        }

        #[tokio::test]
        async fn behind_and_diverged_do_not_match() {
            let forge = MockForge::new()
                .with_comparison(&repo(), SHA, "main", CompareStatus::Behind)
                .with_comparison(&repo(), SHA, "release", CompareStatus::Diverged);
            assert!(!validate_branch(&forge, &repo(), SHA, &["main", "release"])
                .await
                .unwrap());
        }

        #[tokio::test]
        async fn missing_branch_continues() {
            let forge = MockForge::new()
                .fail_on(FailOn::CompareCommits {
                    head: "gone".to_string(),
                    error: ForgeError::NotFound("gone".into()),
                })
                .with_comparison(&repo(), SHA, "main", CompareStatus::Ahead);
            assert!(validate_branch(&forge, &repo(), SHA, &["gone", "main"])
                .await
                .unwrap());
        }

        #[tokio::test]
        async fn other_errors_abort() {
            let forge = MockForge::new()
                .fail_on(FailOn::CompareCommits {
                    head: "main".to_string(),
                    error: ForgeError::RateLimited,
                })
                .with_comparison(&repo(), SHA, "release", CompareStatus::Ahead);
            let err = validate_branch(&forge, &repo(), SHA, &["main", "release"])
                .await
                .unwrap_err();
            assert!(err.as_validation().is_none());
        }

        #[tokio::test]
        async fn no_branches_is_false() {
            let forge = MockForge::new();
            assert!(!validate_branch(&forge, &repo(), SHA, &[]).await.unwrap());
        }
    }
}
