//! core::validate
//!
//! Request-level validation errors and cross-service consistency checks.
//!
//! A validation error is the requester's fault and is safe to show verbatim.
//! Everything else (network, filesystem, template engine) is infrastructure
//! and lives in the engine's error type.

use std::collections::BTreeSet;

use thiserror::Error;

use super::config::{Environment, Service};
use super::types::RepoSlug;

/// A request the engine refuses to act on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("service does not exist: {0}")]
    ServiceNotFound(String),

    #[error("no services specified")]
    NoServices,

    #[error("environment '{environment}' does not exist for service '{service}'")]
    EnvironmentNotFound {
        service: String,
        environment: String,
    },

    #[error("services belong to different repositories: {}", .0.join(", "))]
    MixedRepositories(Vec<String>),

    #[error("services have different deployment branches: {}", .0.join(", "))]
    MixedDeploymentBranches(Vec<String>),

    #[error("commit does not exist: {reference} in {repo}")]
    UnknownCommit { repo: String, reference: String },

    #[error("commit {commit} is not in allowed branches ({})", .branches.join(", "))]
    CommitNotInAllowedBranches {
        commit: String,
        branches: Vec<String>,
    },

    #[error("environment '{environment}' is frozen for service '{service}'")]
    Frozen {
        service: String,
        environment: String,
    },

    #[error("pull request #{number} is already {state}")]
    AlreadyResolved { number: u64, state: String },

    #[error("branch name cannot be the same as the base branch: {0}")]
    SameBranch(String),

    #[error("invalid branch: {0}")]
    InvalidBranch(String),

    #[error("invalid repository: {0}")]
    InvalidRepository(String),
}

/// Ensure every service lives in one source repository and return it.
///
/// # Errors
///
/// `NoServices` for an empty slice, `MixedRepositories` when the services
/// span more than one repository.
pub fn shared_repository(services: &[&Service]) -> Result<RepoSlug, ValidationError> {
    let first = services.first().ok_or(ValidationError::NoServices)?;

    let repos: BTreeSet<String> = services
        .iter()
        .map(|s| format!("{}/{}", s.organization, s.repository).to_ascii_lowercase())
        .collect();
    if repos.len() > 1 {
        return Err(ValidationError::MixedRepositories(
            repos.into_iter().collect(),
        ));
    }

    first
        .source_repo()
        .map_err(|e| ValidationError::InvalidRepository(e.to_string()))
}

/// Check that a set of `(service, environment)` targets can be released in
/// one change: same source repository and same deployment branch.
///
/// Returns the shared deployment branch (`None` means the repository default).
pub fn validate_targets<'a>(
    targets: &[(&'a Service, &'a Environment)],
) -> Result<Option<&'a str>, ValidationError> {
    let services: Vec<&Service> = targets.iter().map(|(s, _)| *s).collect();
    shared_repository(&services)?;

    let branches: BTreeSet<Option<&str>> = targets
        .iter()
        .map(|(_, e)| e.deployment_branch())
        .collect();
    if branches.len() > 1 {
        return Err(ValidationError::MixedDeploymentBranches(
            branches
                .into_iter()
                .map(|b| b.unwrap_or("<default>").to_string())
                .collect(),
        ));
    }

    Ok(branches.into_iter().next().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(branch: Option<&str>) -> Environment {
        Environment {
            name: "prod".to_string(),
            template_path: "t".to_string(),
            generated_path: "g".to_string(),
            allowed_branches: vec![],
            deployment_branch: branch.map(String::from),
            freeze_file_path: None,
        }
    }

    fn service(name: &str, org: &str, repo: &str) -> Service {
        Service {
            name: name.to_string(),
            organization: org.to_string(),
            repository: repo.to_string(),
            tags: vec![],
            environments: vec![environment(None)],
        }
    }

    mod shared_repository {
        use super::*;

        #[test]
        fn single_repository() {
            let a = service("a", "acme", "mono");
            let b = service("b", "Acme", "Mono");
            let repo = shared_repository(&[&a, &b]).unwrap();
            assert_eq!(repo, RepoSlug::new("acme", "mono").unwrap());
        }

        #[test]
        fn mixed_repositories() {
            let a = service("a", "acme", "one");
            let b = service("b", "acme", "two");
            let err = shared_repository(&[&a, &b]).unwrap_err();
            assert_eq!(
                err,
                ValidationError::MixedRepositories(vec![
                    "acme/one".to_string(),
                    "acme/two".to_string()
                ])
            );
        }

        #[test]
        fn empty_is_no_services() {
            assert_eq!(shared_repository(&[]), Err(ValidationError::NoServices));
        }
    }

    mod validate_targets {
        use super::*;

        #[test]
        fn shared_branch_returned() {
            let a = service("a", "acme", "mono");
            let e1 = environment(Some("release"));
            let e2 = environment(Some("release"));
            assert_eq!(
                validate_targets(&[(&a, &e1), (&a, &e2)]),
                Ok(Some("release"))
            );
        }

        #[test]
        fn unset_and_empty_are_the_same_branch() {
            let a = service("a", "acme", "mono");
            let e1 = environment(None);
            let e2 = environment(Some(""));
            assert_eq!(validate_targets(&[(&a, &e1), (&a, &e2)]), Ok(None));
        }

        #[test]
        fn mixed_branches_rejected() {
            let a = service("a", "acme", "mono");
            let b = service("b", "acme", "mono");
            let e1 = environment(Some("main"));
            let e2 = environment(Some("release"));
            let err = validate_targets(&[(&a, &e1), (&b, &e2)]).unwrap_err();
            assert!(matches!(err, ValidationError::MixedDeploymentBranches(_)));
            assert!(err.to_string().contains("different deployment branches"));
        }

        #[test]
        fn repository_check_comes_first() {
            let a = service("a", "acme", "one");
            let b = service("b", "acme", "two");
            let e1 = environment(Some("main"));
            let e2 = environment(Some("release"));
            assert!(matches!(
                validate_targets(&[(&a, &e1), (&b, &e2)]),
                Err(ValidationError::MixedRepositories(_))
            ));
        }
    }

    #[test]
    fn messages_are_user_facing() {
        let err = ValidationError::AlreadyResolved {
            number: 42,
            state: "merged".to_string(),
        };
        assert_eq!(err.to_string(), "pull request #42 is already merged");
        assert_eq!(
            ValidationError::ServiceNotFound("nope".into()).to_string(),
            "service does not exist: nope"
        );
    }
}
