//! engine::freeze
//!
//! Freeze marker handling inside a workspace.
//!
//! An environment is frozen exactly when `{freeze_dir}/.freeze` exists on its
//! deployment branch. The marker's content is informational only.

use std::fmt;
use std::path::Path;

use super::error::DeployError;

/// Marker file name inside the freeze directory.
pub const FREEZE_FILE: &str = ".freeze";

/// Body written into a new marker.
pub const FREEZE_BODY: &str = "# This environment is frozen by releasegate.\n\
# Deployments are rejected while this file exists.\n\
# Use the unfreeze command to remove it; do not delete it by hand.\n";

/// Whether an environment accepts deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeState {
    Active,
    Frozen,
}

impl FreezeState {
    pub fn from_frozen(frozen: bool) -> Self {
        if frozen {
            FreezeState::Frozen
        } else {
            FreezeState::Active
        }
    }

    pub fn is_frozen(self) -> bool {
        self == FreezeState::Frozen
    }
}

impl fmt::Display for FreezeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreezeState::Active => write!(f, "Active"),
            FreezeState::Frozen => write!(f, "Frozen"),
        }
    }
}

/// Requested state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreezeAction {
    Freeze,
    Unfreeze,
}

impl FreezeAction {
    /// Verb used in branch names, titles and log lines.
    pub fn verb(self) -> &'static str {
        match self {
            FreezeAction::Freeze => "freeze",
            FreezeAction::Unfreeze => "unfreeze",
        }
    }

    /// State the environment is in after the action.
    pub fn target(self) -> FreezeState {
        match self {
            FreezeAction::Freeze => FreezeState::Frozen,
            FreezeAction::Unfreeze => FreezeState::Active,
        }
    }
}

impl fmt::Display for FreezeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Result of [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeChange {
    /// Marker path relative to the workspace root, always set.
    pub path: String,
    /// False when the environment was already in the target state.
    pub changed: bool,
}

/// Marker path relative to the workspace root.
///
/// ```
/// use releasegate::engine::freeze::marker_path;
///
/// assert_eq!(marker_path("deploy/payments/prod"), "deploy/payments/prod/.freeze");
/// assert_eq!(marker_path("deploy/payments/prod/"), "deploy/payments/prod/.freeze");
/// ```
pub fn marker_path(freeze_dir: &str) -> String {
    let dir = freeze_dir.trim_end_matches('/');
    if dir.is_empty() {
        FREEZE_FILE.to_string()
    } else {
        format!("{}/{}", dir, FREEZE_FILE)
    }
}

/// Current state of the environment whose marker lives in `freeze_dir`.
pub fn state(root: &Path, freeze_dir: &str) -> FreezeState {
    FreezeState::from_frozen(is_frozen(root, freeze_dir))
}

pub fn is_frozen(root: &Path, freeze_dir: &str) -> bool {
    root.join(marker_path(freeze_dir)).is_file()
}

/// Move the environment into `action`'s target state on disk.
///
/// # Errors
///
/// Filesystem failures writing or removing the marker.
pub fn apply(root: &Path, freeze_dir: &str, action: FreezeAction) -> Result<FreezeChange, DeployError> {
    let path = marker_path(freeze_dir);
    let full = root.join(&path);

    if state(root, freeze_dir) == action.target() {
        return Ok(FreezeChange {
            path,
            changed: false,
        });
    }

    match action {
        FreezeAction::Freeze => {
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
            }
            std::fs::write(&full, FREEZE_BODY).map_err(|e| DeployError::io(&full, e))?;
        }
        FreezeAction::Unfreeze => {
            std::fs::remove_file(&full).map_err(|e| DeployError::io(&full, e))?;
        }
    }

    Ok(FreezeChange {
        path,
        changed: true,
    })
}
