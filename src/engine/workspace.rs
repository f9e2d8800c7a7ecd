//! engine::workspace
//!
//! Point-in-time snapshot of a deployment branch in a private staging
//! directory.
//!
//! # Lifecycle
//!
//! [`Workspace::snapshot`] unpacks the archive of the base branch's head.
//! [`Workspace::branch`] then resets the working branch to that commit
//! (delete, then create), so callers can inspect the snapshot before the
//! first write. [`Workspace::open`] does both at once. The directory is only
//! a content snapshot: commits are built from it through the forge's object
//! API, never with a local git.
//!
//! The staging directory is removed when the workspace drops, on every exit
//! path including a dropped future.

use std::io::Read;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use super::error::{DeployError, ForgeResultExt, ValidationError};
use crate::core::types::{BranchName, Oid, RepoSlug};
use crate::forge::Forge;

const STAGING_PREFIX: &str = "releasegate-";

/// A staged snapshot of one branch of the deployment repository.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    repo: RepoSlug,
    base: BranchName,
    work: Option<BranchName>,
    base_sha: Oid,
    head: Oid,
}

impl Workspace {
    /// Reset `work` to the head of `base` and stage that commit.
    ///
    /// `base` of `None` (or empty) means `default_branch`.
    ///
    /// # Errors
    ///
    /// - `SameBranch` when `work` equals the resolved base
    /// - `InvalidBranch` when the base branch does not exist
    /// - infrastructure errors from the forge or the filesystem
    pub async fn open(
        forge: &dyn Forge,
        repo: &RepoSlug,
        default_branch: &BranchName,
        base: Option<&str>,
        work: &BranchName,
        scratch_root: &Path,
    ) -> Result<Self, DeployError> {
        let mut workspace = Self::snapshot(forge, repo, default_branch, base, scratch_root).await?;
        workspace.branch(forge, work).await?;
        Ok(workspace)
    }

    /// Point `work` at the commit this snapshot was taken from, replacing
    /// any existing branch of that name. Later commits go on `work`.
    pub async fn branch(&mut self, forge: &dyn Forge, work: &BranchName) -> Result<(), DeployError> {
        if &self.base == work {
            return Err(ValidationError::SameBranch(work.to_string()).into());
        }

        match forge.delete_branch(&self.repo, work).await {
            Ok(()) => debug!(branch = %work, "deleted stale working branch"),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e).during("delete working branch"),
        }

        forge
            .create_branch(&self.repo, work, &self.base_sha)
            .await
            .during("create working branch")?;
        debug!(branch = %work, base = %self.base, sha = %self.base_sha.short(7), "created working branch");

        self.work = Some(work.clone());
        self.head = self.base_sha.clone();
        Ok(())
    }

    /// Stage the head of `base` without touching any branch.
    pub async fn snapshot(
        forge: &dyn Forge,
        repo: &RepoSlug,
        default_branch: &BranchName,
        base: Option<&str>,
        scratch_root: &Path,
    ) -> Result<Self, DeployError> {
        let base = resolve_base(default_branch, base)?;
        let base_sha = base_head(forge, repo, &base).await?;
        let dir = stage(forge, repo, &base_sha, scratch_root).await?;

        Ok(Self {
            dir,
            repo: repo.clone(),
            base,
            work: None,
            head: base_sha.clone(),
            base_sha,
        })
    }

    /// Staging directory holding the snapshot.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn repo(&self) -> &RepoSlug {
        &self.repo
    }

    pub fn base_branch(&self) -> &BranchName {
        &self.base
    }

    /// The working branch, `None` for a read-only snapshot.
    pub fn working_branch(&self) -> Option<&BranchName> {
        self.work.as_ref()
    }

    /// Commit the snapshot was taken from.
    pub fn base_sha(&self) -> &Oid {
        &self.base_sha
    }

    /// Tip of the working branch as far as this workspace knows.
    pub fn head(&self) -> &Oid {
        &self.head
    }

    pub(crate) fn advance(&mut self, sha: Oid) {
        self.head = sha;
    }

    /// Remove the staging directory now, reporting failures.
    pub fn close(self) -> Result<(), DeployError> {
        let path: PathBuf = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| DeployError::io(path, e))
    }
}

fn resolve_base(default_branch: &BranchName, base: Option<&str>) -> Result<BranchName, DeployError> {
    match base.map(str::trim).filter(|b| !b.is_empty()) {
        None => Ok(default_branch.clone()),
        Some(name) => BranchName::new(name)
            .map_err(|e| ValidationError::InvalidBranch(e.to_string()).into()),
    }
}

async fn base_head(forge: &dyn Forge, repo: &RepoSlug, base: &BranchName) -> Result<Oid, DeployError> {
    match forge.get_branch(repo, base).await {
        Ok(branch) => Ok(branch.sha),
        Err(e) if e.is_not_found() => Err(ValidationError::InvalidBranch(format!(
            "branch '{}' does not exist in {}",
            base, repo
        ))
        .into()),
        Err(e) => Err(e).during("read base branch"),
    }
}

async fn stage(
    forge: &dyn Forge,
    repo: &RepoSlug,
    sha: &Oid,
    scratch_root: &Path,
) -> Result<TempDir, DeployError> {
    let archive = forge
        .download_archive(repo, sha.as_str())
        .await
        .during("download repository archive")?;
    debug!(bytes = archive.len(), sha = %sha.short(7), "downloaded archive");

    std::fs::create_dir_all(scratch_root).map_err(|e| DeployError::io(scratch_root, e))?;
    let dir = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(scratch_root)
        .map_err(|e| DeployError::io(scratch_root, e))?;

    extract(&archive, dir.path())?;
    Ok(dir)
}

/// Unpack a forge archive into `dest`, dropping the single top-level folder
/// the forge wraps every entry in.
fn extract(data: &[u8], dest: &Path) -> Result<(), DeployError> {
    let archive_err = |e: zip::result::ZipError| DeployError::Archive(e.to_string());
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).map_err(archive_err)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(archive_err)?;

        // Entries with unsafe paths are skipped.
        let Some(enclosed) = file.enclosed_name() else {
            continue;
        };
        let relative: PathBuf = enclosed.components().skip(1).collect();
        if relative.as_os_str().is_empty() {
            continue;
        }
        let outpath = dest.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| DeployError::io(&outpath, e))?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
        }
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .map_err(|e| DeployError::Archive(format!("{}: {}", file.name(), e)))?;
        std::fs::write(&outpath, &buffer).map_err(|e| DeployError::io(&outpath, e))?;
    }

    Ok(())
}
