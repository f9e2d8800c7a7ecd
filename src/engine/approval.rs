//! engine::approval
//!
//! Opening and resolving change requests on the deployment repository.

use tracing::{debug, info, warn};

use super::error::{DeployError, ForgeResultExt, ValidationError};
use crate::core::types::{BranchName, RepoSlug};
use crate::forge::{
    CreatePrRequest, Forge, ForgeError, MergeMethod, PrState, PrStateUpdate, UpdatePrRequest,
};

/// Longest diff shown inline, in bytes.
pub const DIFF_DISPLAY_LIMIT: usize = 2900;

/// Shown in place of an empty diff.
pub const EMPTY_DIFF: &str = "Nothing to change, the rendered output is identical.";

/// A freshly opened change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedChange {
    pub number: u64,
    pub url: String,
    pub diff: String,
}

/// Open a change request merging `work` into `base` and fetch its diff.
pub async fn open(
    forge: &dyn Forge,
    repo: &RepoSlug,
    title: &str,
    description: &str,
    base: &BranchName,
    work: &BranchName,
) -> Result<OpenedChange, DeployError> {
    let pr = forge
        .create_pr(
            repo,
            CreatePrRequest {
                head: work.to_string(),
                base: base.to_string(),
                title: title.to_string(),
                body: Some(description.to_string()),
            },
        )
        .await
        .during("create pull request")?;

    let diff = forge
        .get_pr_diff(repo, pr.number)
        .await
        .during("fetch pull request diff")?;

    info!(number = pr.number, url = %pr.url, head = %work, base = %base, "opened change request");
    Ok(OpenedChange {
        number: pr.number,
        url: pr.url,
        diff,
    })
}

/// Squash-merge change request `number` and delete its branch.
///
/// # Errors
///
/// `AlreadyResolved` if it was merged or closed before. A merged request
/// still gets its leftover branch cleaned up.
pub async fn approve(forge: &dyn Forge, repo: &RepoSlug, number: u64) -> Result<(), DeployError> {
    let pr = forge.get_pr(repo, number).await.during("fetch pull request")?;

    match pr.state {
        PrState::Merged => {
            if let Err(e) = delete_head(forge, repo, &pr.head).await {
                warn!(number, branch = %pr.head, error = %e, "failed to clean up merged branch");
            }
            Err(already_resolved(number, pr.state))
        }
        PrState::Closed => Err(already_resolved(number, pr.state)),
        PrState::Open => {
            forge
                .merge_pr(repo, number, MergeMethod::Squash)
                .await
                .during("merge pull request")?;
            info!(number, "merged change request");
            delete_head(forge, repo, &pr.head)
                .await
                .during("delete working branch")
        }
    }
}

/// Close change request `number` without merging and delete its branch.
///
/// Closing an already closed request succeeds.
pub async fn cancel(forge: &dyn Forge, repo: &RepoSlug, number: u64) -> Result<(), DeployError> {
    let pr = forge.get_pr(repo, number).await.during("fetch pull request")?;

    match pr.state {
        PrState::Merged => return Err(already_resolved(number, pr.state)),
        PrState::Closed => debug!(number, "change request already closed"),
        PrState::Open => {
            forge
                .update_pr(
                    repo,
                    UpdatePrRequest {
                        number,
                        state: Some(PrStateUpdate::Closed),
                        ..Default::default()
                    },
                )
                .await
                .during("close pull request")?;
            info!(number, "closed change request");
        }
    }

    delete_head(forge, repo, &pr.head)
        .await
        .during("delete working branch")
}

/// Delete a change request's head branch; absence counts as success.
async fn delete_head(forge: &dyn Forge, repo: &RepoSlug, head: &str) -> Result<(), ForgeError> {
    let branch = BranchName::new(head)
        .map_err(|e| ForgeError::InvalidResponse(format!("head branch '{}': {}", head, e)))?;
    match forge.delete_branch(repo, &branch).await {
        Ok(()) => {
            debug!(branch = %branch, "deleted working branch");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

fn already_resolved(number: u64, state: PrState) -> DeployError {
    ValidationError::AlreadyResolved {
        number,
        state: state.to_string(),
    }
    .into()
}

/// Shorten a unified diff for inline display.
///
/// Anything before the first `---` line header is dropped; the rest is cut at
/// [`DIFF_DISPLAY_LIMIT`] bytes with a trailing `...`. An empty diff becomes
/// [`EMPTY_DIFF`].
///
/// ```
/// use releasegate::engine::approval::{truncate_diff, EMPTY_DIFF};
///
/// let diff = "diff --git a/x b/x\nindex 1..2\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n";
/// assert!(truncate_diff(diff).starts_with("--- a/x"));
/// assert_eq!(truncate_diff(""), EMPTY_DIFF);
/// ```
pub fn truncate_diff(diff: &str) -> String {
    if diff.trim().is_empty() {
        return EMPTY_DIFF.to_string();
    }
    let body = match diff.find("---") {
        Some(start) => &diff[start..],
        None => diff,
    };
    super::error::truncate(body, DIFF_DISPLAY_LIMIT)
}
