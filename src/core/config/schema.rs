//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! scratch_dir = "/var/tmp/releasegate"
//!
//! [github]
//! owner = "acme"
//! repo = "deployments"
//! default_branch = "main"
//! author_name = "Release Gate"
//! author_email = "releasegate@acme.io"
//!
//! [logging]
//! filter = "releasegate=debug,info"
//!
//! [[services]]
//! name = "payments"
//! organization = "acme"
//! repository = "payments"
//! tags = ["core"]
//!
//! [[services.environments]]
//! name = "prod"
//! template_path = "templates/payments/prod"
//! generated_path = "generated/payments/prod"
//! allowed_branches = ["main"]
//! deployment_branch = "main"
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing: service and environment names are
//! unique (case-insensitive, the same way lookups match them), paths are
//! non-empty and relative, and branch names are valid refnames.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::{BranchName, Identity, RepoSlug};

/// Default environment variable holding the hosting API token.
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Default committer name used for the service identity.
pub const DEFAULT_AUTHOR_NAME: &str = "Release Gate";

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Root directory for disposable staging workspaces (default: system temp dir)
    pub scratch_dir: Option<PathBuf>,

    /// Deployment repository and hosting credentials
    pub github: GitHubSettings,

    /// Log filter settings
    pub logging: LoggingSettings,

    /// Service catalog
    pub services: Vec<Service>,
}

impl EngineConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.github.validate()?;

        let mut seen = HashSet::new();
        for service in &self.services {
            service.validate()?;
            if !seen.insert(service.name.to_ascii_lowercase()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate service name '{}'",
                    service.name
                )));
            }
        }

        Ok(())
    }

    /// Staging root, falling back to the system temp directory.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Deployment repository and hosting API settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubSettings {
    /// Owner of the deployment repository
    pub owner: String,

    /// Name of the deployment repository
    pub repo: String,

    /// Default branch of the deployment repository; looked up when unset
    pub default_branch: Option<String>,

    /// API base URL (GitHub Enterprise); defaults to the public API
    pub api_base: Option<String>,

    /// Environment variable that holds the API token
    pub token_env: Option<String>,

    /// Committer name for the service identity
    pub author_name: Option<String>,

    /// Committer email for the service identity
    pub author_email: String,
}

impl GitHubSettings {
    /// Validate the hosting settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.deployment_repo()?;
        self.default_branch()?;
        if self.author_email.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "github.author_email cannot be empty".to_string(),
            ));
        }
        if let Some(base) = &self.api_base {
            if !(base.starts_with("https://") || base.starts_with("http://")) {
                return Err(ConfigError::InvalidValue(format!(
                    "github.api_base must be an http(s) URL, got '{}'",
                    base
                )));
            }
        }
        Ok(())
    }

    /// Coordinates of the deployment repository.
    pub fn deployment_repo(&self) -> Result<RepoSlug, ConfigError> {
        RepoSlug::new(&self.owner, &self.repo)
            .map_err(|e| ConfigError::InvalidValue(format!("github owner/repo: {}", e)))
    }

    /// Configured default branch, if any.
    pub fn default_branch(&self) -> Result<Option<BranchName>, ConfigError> {
        match self.default_branch.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) => BranchName::new(name).map(Some).map_err(|e| {
                ConfigError::InvalidValue(format!("github.default_branch: {}", e))
            }),
        }
    }

    /// Environment variable holding the API token.
    pub fn token_env(&self) -> &str {
        self.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV)
    }

    /// The service identity recorded as committer.
    pub fn committer(&self) -> Identity {
        Identity::new(
            self.author_name.as_deref().unwrap_or(DEFAULT_AUTHOR_NAME),
            &self.author_email,
        )
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive (default: "info")
    pub filter: Option<String>,
}

impl LoggingSettings {
    pub fn filter(&self) -> &str {
        self.filter.as_deref().unwrap_or("info")
    }
}

/// A deployable service and the environments it can be released to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Service {
    pub name: String,

    /// Owner of the service's source repository
    pub organization: String,

    /// Name of the service's source repository
    pub repository: String,

    /// Alternate selectors that expand to every service carrying them
    #[serde(default)]
    pub tags: Vec<String>,

    pub environments: Vec<Environment>,
}

impl Service {
    /// Source repository coordinates.
    ///
    /// Validated at config load, so the slug is always constructible for a
    /// loaded service.
    pub fn source_repo(&self) -> Result<RepoSlug, ConfigError> {
        RepoSlug::new(&self.organization, &self.repository).map_err(|e| {
            ConfigError::InvalidValue(format!("service '{}': {}", self.name, e))
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "service name cannot be empty".to_string(),
            ));
        }
        self.source_repo()?;

        if self.environments.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "service '{}' has no environments",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for environment in &self.environments {
            environment.validate(&self.name)?;
            if !seen.insert(environment.name.to_ascii_lowercase()) {
                return Err(ConfigError::InvalidValue(format!(
                    "service '{}' declares environment '{}' twice",
                    self.name, environment.name
                )));
            }
        }
        Ok(())
    }
}

/// One release target of a service inside the deployment repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    pub name: String,

    /// Directory of manifest templates, relative to the deployment repository root
    pub template_path: String,

    /// Directory the rendered manifests are written to
    pub generated_path: String,

    /// Branches of the source repository a deployed commit must belong to (empty = any)
    #[serde(default)]
    pub allowed_branches: Vec<String>,

    /// Branch of the deployment repository to release into (unset = default branch)
    #[serde(default)]
    pub deployment_branch: Option<String>,

    /// Directory holding the `.freeze` marker (unset = `template_path`)
    #[serde(default)]
    pub freeze_file_path: Option<String>,
}

impl Environment {
    /// Deployment branch, with unset and empty treated alike.
    pub fn deployment_branch(&self) -> Option<&str> {
        self.deployment_branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    /// Directory holding the freeze marker.
    pub fn freeze_dir(&self) -> &str {
        self.freeze_file_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.template_path)
    }

    /// Allowed source branches with blanks dropped.
    pub fn allowed_branches(&self) -> Vec<&str> {
        self.allowed_branches
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect()
    }

    /// Whether rebuilding `generated_path` would wipe the templates or the
    /// freeze marker: the generated directory is one of them or an ancestor.
    pub fn generated_overlaps_sources(&self) -> bool {
        let generated = path_parts(&self.generated_path);
        [self.template_path.as_str(), self.freeze_dir()]
            .into_iter()
            .any(|source| path_parts(source).starts_with(&generated))
    }

    fn validate(&self, service: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| {
            Err(ConfigError::InvalidValue(format!(
                "service '{}', environment '{}': {}",
                service, self.name, message
            )))
        };

        if self.name.trim().is_empty() {
            return invalid("environment name cannot be empty".to_string());
        }

        for (field, value) in [
            ("template_path", Some(self.template_path.as_str())),
            ("generated_path", Some(self.generated_path.as_str())),
            ("freeze_file_path", self.freeze_file_path.as_deref()),
        ] {
            let Some(value) = value else { continue };
            if field != "freeze_file_path" && value.trim().is_empty() {
                return invalid(format!("{} cannot be empty", field));
            }
            if value.starts_with('/') || value.split('/').any(|part| part == "..") {
                return invalid(format!(
                    "{} must be relative to the repository root, got '{}'",
                    field, value
                ));
            }
        }

        if self.generated_overlaps_sources() {
            return invalid(format!(
                "generated_path '{}' must not contain template_path '{}' or the freeze marker",
                self.generated_path, self.template_path
            ));
        }

        if let Some(branch) = self.deployment_branch() {
            if let Err(e) = BranchName::new(branch) {
                return invalid(format!("deployment_branch: {}", e));
            }
        }
        for branch in self.allowed_branches() {
            if let Err(e) = BranchName::new(branch) {
                return invalid(format!("allowed_branches: {}", e));
            }
        }

        Ok(())
    }
}

/// Non-empty components of a `/`-separated repository path.
fn path_parts(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != ".")
        .collect()
}
