//! End-to-end tests for the release engine.
//!
//! Every test drives a [`Deployer`] against an in-memory [`MockForge`]
//! holding a deployment repository and the services' source repositories,
//! then inspects the resulting branches, commits and pull requests.

use std::sync::Arc;

use releasegate::core::config::{EngineConfig, Environment, GitHubSettings, Service};
use releasegate::core::types::{Identity, Oid, RepoSlug};
use releasegate::engine::{
    ChangeKind, Context, DeployError, DeployRequest, Deployer, ErrorKind, FreezeAction,
    FreezeRequest, Operation, Outcome, ValidationError,
};
use releasegate::forge::mock::{MockForge, MockOperation};
use releasegate::forge::{CompareStatus, PrState, PullRequest, ResolvedCommit};

const TEMPLATE: &str =
    "service: {{ ServiceName }}\nenvironment: {{ Environment }}\nimage: registry/{{ ServiceName }}:{{ Version }}\n";

fn deployments() -> RepoSlug {
    RepoSlug::new("acme", "deployments").unwrap()
}

fn infra() -> RepoSlug {
    RepoSlug::new("acme", "infra").unwrap()
}

fn environment(service: &str, name: &str) -> Environment {
    Environment {
        name: name.to_string(),
        template_path: format!("templates/{}/{}", service, name),
        generated_path: format!("generated/{}/{}", service, name),
        allowed_branches: vec![],
        deployment_branch: None,
        freeze_file_path: None,
    }
}

fn service(name: &str, repository: &str, tags: &[&str], environments: Vec<Environment>) -> Service {
    Service {
        name: name.to_string(),
        organization: "acme".to_string(),
        repository: repository.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        environments,
    }
}

fn config(scratch: &std::path::Path) -> EngineConfig {
    let mut payments_prod = environment("payments", "prod");
    payments_prod.allowed_branches = vec!["main".to_string()];
    let mut billing_prod = environment("billing", "prod");
    billing_prod.deployment_branch = Some("release".to_string());

    EngineConfig {
        scratch_dir: Some(scratch.to_path_buf()),
        github: GitHubSettings {
            owner: "acme".to_string(),
            repo: "deployments".to_string(),
            author_name: Some("releasegate".to_string()),
            author_email: "releasegate@acme.test".to_string(),
            ..Default::default()
        },
        services: vec![
            service(
                "payments",
                "infra",
                &["core"],
                vec![payments_prod, environment("payments", "staging")],
            ),
            service("ledger", "infra", &["core"], vec![environment("ledger", "prod")]),
            service("billing", "infra", &[], vec![billing_prod]),
            service("search", "search", &[], vec![environment("search", "prod")]),
        ],
        ..Default::default()
    }
}

fn forge() -> MockForge {
    MockForge::new()
        .with_repo(
            &deployments(),
            "main",
            [
                ("README.md", "deployment manifests\n"),
                ("templates/payments/prod/deployment.yaml", TEMPLATE),
                ("templates/payments/staging/deployment.yaml", TEMPLATE),
                ("templates/ledger/prod/deployment.yaml", TEMPLATE),
                ("templates/search/prod/deployment.yaml", TEMPLATE),
                ("generated/payments/prod/legacy.yaml", "retired: true\n"),
            ],
        )
        .with_branch(
            &deployments(),
            "release",
            [("templates/billing/prod/deployment.yaml", TEMPLATE)],
        )
        .with_repo(&infra(), "main", [("src/lib.rs", "pub fn v1() {}\n")])
        .with_branch(&infra(), "feature", [("src/lib.rs", "pub fn v2() {}\n")])
}

struct Harness {
    forge: MockForge,
    deployer: Deployer,
    ctx: Context,
    _scratch: tempfile::TempDir,
}

fn harness(forge: MockForge) -> Harness {
    let scratch = tempfile::TempDir::new().unwrap();
    let deployer = Deployer::new(&config(scratch.path()), Arc::new(forge.clone())).unwrap();
    Harness {
        forge,
        deployer,
        ctx: Context::new("dana"),
        _scratch: scratch,
    }
}

fn dana() -> Identity {
    Identity::new("Dana", "dana@acme.test")
}

fn deploy_request(services: &[&str], environment: &str, reference: &str) -> DeployRequest {
    DeployRequest {
        services: services.iter().map(|s| s.to_string()).collect(),
        environment: environment.to_string(),
        reference: reference.to_string(),
        commit_url: None,
        author: dana(),
    }
}

fn freeze_request(services: &[&str], environment: &str, action: FreezeAction) -> FreezeRequest {
    FreezeRequest {
        services: services.iter().map(|s| s.to_string()).collect(),
        environment: environment.to_string(),
        action,
        author: dana(),
    }
}

fn commits(forge: &MockForge) -> usize {
    forge
        .operations()
        .iter()
        .filter(|op| matches!(op, MockOperation::CreateCommit { .. }))
        .count()
}

fn validation(err: &DeployError) -> &ValidationError {
    err.as_validation()
        .unwrap_or_else(|| panic!("expected a validation error, got {err:?}"))
}

mod deploy {
    use super::*;

    #[tokio::test]
    async fn renders_commits_and_opens_change_request() {
        let h = harness(forge());
        let sha = h.forge.branch_sha(&infra(), "main").unwrap();

        let change = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "prod", "main"))
            .await
            .unwrap();

        assert_eq!(change.kind, ChangeKind::Deploy);
        assert_eq!(change.services, vec!["payments"]);
        assert_eq!(change.environment, "prod");
        assert_eq!(change.branch, "releasegate/deploy-payments-prod");
        assert_eq!(change.base_branch, "main");
        assert_eq!(change.number, 1);
        assert!(change.url.ends_with("/pull/1"));

        let rendered = h
            .forge
            .file(&deployments(), &change.branch, "generated/payments/prod/deployment.yaml")
            .unwrap();
        assert_eq!(
            rendered,
            format!(
                "service: payments\nenvironment: prod\nimage: registry/payments:{}\n",
                sha
            )
        );
        assert!(change.diff.contains(&format!("+image: registry/payments:{}", sha)));

        // Nothing lands on main before approval.
        assert!(h
            .forge
            .file(&deployments(), "main", "generated/payments/prod/deployment.yaml")
            .is_none());

        let head = h.forge.branch_sha(&deployments(), &change.branch).unwrap();
        assert_eq!(
            h.forge.commit_message(&deployments(), &head).as_deref(),
            Some(
                format!(
                    "releasegate: Deploy payments to prod commit {} triggered by Dana",
                    sha.short(7)
                )
                .as_str()
            )
        );
    }

    #[tokio::test]
    async fn removes_outputs_without_template() {
        let h = harness(forge());

        let change = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "prod", "main"))
            .await
            .unwrap();

        assert!(h
            .forge
            .file(&deployments(), &change.branch, "generated/payments/prod/legacy.yaml")
            .is_none());
        assert!(change.diff.contains("-retired: true"));
    }

    #[tokio::test]
    async fn one_commit_per_service() {
        let h = harness(forge());

        let change = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["core"], "prod", "main"))
            .await
            .unwrap();

        assert_eq!(change.services, vec!["payments", "ledger"]);
        assert_eq!(change.branch, "releasegate/deploy-payments-ledger-prod");
        assert_eq!(commits(&h.forge), 2);

        let head = h.forge.branch_sha(&deployments(), &change.branch).unwrap();
        let parents = h.forge.commit_parents(&deployments(), &head);
        assert_eq!(parents.len(), 1);
        assert_eq!(h.forge.commit_parents(&deployments(), &parents[0]).len(), 1);
        assert!(h
            .forge
            .file(&deployments(), &change.branch, "generated/ledger/prod/deployment.yaml")
            .is_some());
    }

    #[tokio::test]
    async fn ref_ahead_of_allowed_branch_proceeds() {
        let sha = Oid::new("abc1234".repeat(5) + "abcde").unwrap();
        let forge = forge()
            .with_commit(
                &infra(),
                "abc1234",
                ResolvedCommit {
                    sha: sha.clone(),
                    url: format!("https://github.com/acme/infra/commit/{}", sha),
                },
            )
            .with_comparison(&infra(), sha.as_str(), "main", CompareStatus::Ahead);
        let h = harness(forge);

        let change = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "prod", "abc1234"))
            .await
            .unwrap();

        let rendered = h
            .forge
            .file(&deployments(), &change.branch, "generated/payments/prod/deployment.yaml")
            .unwrap();
        assert!(rendered.contains(sha.as_str()));
    }

    #[tokio::test]
    async fn commit_outside_allowed_branches_rejected_without_writes() {
        let h = harness(forge());

        let err = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "prod", "feature"))
            .await
            .unwrap_err();

        assert!(matches!(
            validation(&err),
            ValidationError::CommitNotInAllowedBranches { branches, .. } if branches == &["main"]
        ));
        assert!(h.forge.writes().is_empty());
    }

    #[tokio::test]
    async fn unrestricted_environment_accepts_any_ref() {
        let h = harness(forge());

        h.deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "staging", "feature"))
            .await
            .unwrap();

        assert!(!h
            .forge
            .operations()
            .iter()
            .any(|op| matches!(op, MockOperation::CompareCommits { .. })));
    }

    #[tokio::test]
    async fn mixed_deployment_branches_rejected_without_writes() {
        let h = harness(forge());

        let err = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments", "billing"], "prod", "main"))
            .await
            .unwrap_err();

        assert!(matches!(
            validation(&err),
            ValidationError::MixedDeploymentBranches(_)
        ));
        assert!(h.forge.operations().is_empty());
    }

    #[tokio::test]
    async fn mixed_repositories_rejected_without_writes() {
        let h = harness(forge());

        let err = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments", "search"], "prod", "main"))
            .await
            .unwrap_err();

        assert!(matches!(validation(&err), ValidationError::MixedRepositories(_)));
        assert!(h.forge.writes().is_empty());
    }

    #[tokio::test]
    async fn unknown_ref_is_validation_error() {
        let h = harness(forge());

        let err = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "staging", "no-such-ref"))
            .await
            .unwrap_err();

        assert!(matches!(validation(&err), ValidationError::UnknownCommit { .. }));
        assert!(h.forge.writes().is_empty());
    }

    #[tokio::test]
    async fn unknown_service_and_environment() {
        let h = harness(forge());

        let err = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["ghost"], "prod", "main"))
            .await
            .unwrap_err();
        assert!(matches!(validation(&err), ValidationError::ServiceNotFound(_)));

        let err = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "qa", "main"))
            .await
            .unwrap_err();
        assert!(matches!(
            validation(&err),
            ValidationError::EnvironmentNotFound { .. }
        ));
        assert!(h.forge.operations().is_empty());
    }

    #[tokio::test]
    async fn resolved_commit_skips_lookup() {
        let h = harness(forge());
        let sha = h.forge.branch_sha(&infra(), "main").unwrap();
        let request = DeployRequest {
            commit_url: Some("https://ci.acme.test/builds/7".to_string()),
            ..deploy_request(&["payments"], "staging", sha.as_str())
        };

        h.deployer.deploy(&h.ctx, request).await.unwrap();

        assert!(!h
            .forge
            .operations()
            .iter()
            .any(|op| matches!(op, MockOperation::GetCommit { .. })));
        let pr = h.forge.get_pr_sync(&deployments(), 1).unwrap();
        assert!(pr
            .body
            .unwrap()
            .contains("(https://ci.acme.test/builds/7)"));
    }

    #[tokio::test]
    async fn redeploy_resets_working_branch() {
        let h = harness(forge());

        let first = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "staging", "main"))
            .await
            .unwrap();
        h.deployer.cancel(&h.ctx, first.number).await.unwrap();

        let second = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "staging", "feature"))
            .await
            .unwrap();

        assert_eq!(first.branch, second.branch);
        let head = h.forge.branch_sha(&deployments(), &second.branch).unwrap();
        let parents = h.forge.commit_parents(&deployments(), &head);
        assert_eq!(
            parents,
            vec![h.forge.branch_sha(&deployments(), "main").unwrap()]
        );
    }

    #[tokio::test]
    async fn deploys_onto_configured_branch() {
        let h = harness(forge());

        let change = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["billing"], "prod", "main"))
            .await
            .unwrap();

        assert_eq!(change.base_branch, "release");
        let pr = h.forge.get_pr_sync(&deployments(), change.number).unwrap();
        assert_eq!(pr.base, "release");
    }
}

mod freeze {
    use super::*;

    #[tokio::test]
    async fn freeze_approve_then_freeze_again_writes_once() {
        let h = harness(forge());

        let change = h
            .deployer
            .freeze(&h.ctx, freeze_request(&["payments"], "prod", FreezeAction::Freeze))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.kind, ChangeKind::Freeze);
        assert_eq!(change.branch, "releasegate/freeze-payments-prod");
        assert!(h
            .forge
            .file(&deployments(), &change.branch, "templates/payments/prod/.freeze")
            .is_some());
        assert_eq!(commits(&h.forge), 1);

        h.deployer.approve(&h.ctx, change.number).await.unwrap();
        assert!(h
            .forge
            .file(&deployments(), "main", "templates/payments/prod/.freeze")
            .is_some());

        h.forge.clear_operations();
        let again = h
            .deployer
            .freeze(&h.ctx, freeze_request(&["payments"], "prod", FreezeAction::Freeze))
            .await
            .unwrap();

        assert!(again.is_none());
        assert!(h.forge.writes().is_empty());
        assert!(!h.forge.has_branch(&deployments(), "releasegate/freeze-payments-prod"));
    }

    #[tokio::test]
    async fn unfreeze_without_marker_changes_nothing() {
        let h = harness(forge());

        let outcome = h
            .deployer
            .freeze(&h.ctx, freeze_request(&["payments"], "prod", FreezeAction::Unfreeze))
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert_eq!(commits(&h.forge), 0);
        assert!(h.forge.writes().is_empty());
        assert_eq!(h.forge.pr_count(&deployments()), 0);
    }

    #[tokio::test]
    async fn frozen_environment_blocks_deploy() {
        let forge = forge().with_branch(
            &deployments(),
            "main",
            [
                ("templates/payments/prod/deployment.yaml", TEMPLATE),
                ("templates/payments/prod/.freeze", "# frozen\n"),
            ],
        );
        let h = harness(forge);

        let err = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "prod", "main"))
            .await
            .unwrap_err();

        assert!(matches!(
            validation(&err),
            ValidationError::Frozen { service, environment }
                if service == "payments" && environment == "prod"
        ));
        assert!(h.forge.writes().is_empty());
    }

    #[tokio::test]
    async fn unfreeze_removes_marker() {
        let forge = forge().with_branch(
            &deployments(),
            "main",
            [
                ("templates/payments/prod/deployment.yaml", TEMPLATE),
                ("templates/payments/prod/.freeze", "# frozen\n"),
            ],
        );
        let h = harness(forge);

        let change = h
            .deployer
            .freeze(&h.ctx, freeze_request(&["payments"], "prod", FreezeAction::Unfreeze))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(change.kind, ChangeKind::Unfreeze);
        assert!(h
            .forge
            .file(&deployments(), &change.branch, "templates/payments/prod/.freeze")
            .is_none());
        assert!(change.diff.contains("-# frozen"));
    }

    #[tokio::test]
    async fn one_commit_per_frozen_service() {
        let h = harness(forge());

        let change = h
            .deployer
            .freeze(
                &h.ctx,
                freeze_request(&["payments", "ledger"], "prod", FreezeAction::Freeze),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(change.services, vec!["payments", "ledger"]);
        let messages: Vec<String> = h
            .forge
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::CreateCommit { message } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Freeze payments in prod"));
        assert!(messages[1].contains("Freeze ledger in prod"));
        for service in ["payments", "ledger"] {
            let marker = format!("templates/{}/prod/.freeze", service);
            assert!(h.forge.file(&deployments(), &change.branch, &marker).is_some());
        }
    }

    #[tokio::test]
    async fn freeze_by_tag_commits_only_changed_markers() {
        let forge = forge().with_branch(
            &deployments(),
            "main",
            [
                ("templates/payments/prod/deployment.yaml", TEMPLATE),
                ("templates/payments/prod/.freeze", "# frozen\n"),
                ("templates/ledger/prod/deployment.yaml", TEMPLATE),
            ],
        );
        let h = harness(forge);

        let change = h
            .deployer
            .freeze(&h.ctx, freeze_request(&["core"], "prod", FreezeAction::Freeze))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(change.services, vec!["payments", "ledger"]);
        let tree_paths: Vec<Vec<String>> = h
            .forge
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::CreateTree { paths } => Some(paths),
                _ => None,
            })
            .collect();
        assert_eq!(tree_paths, vec![vec!["templates/ledger/prod/.freeze".to_string()]]);
    }
}

mod approval {
    use super::*;

    #[tokio::test]
    async fn approve_merges_and_deletes_branch() {
        let h = harness(forge());
        let change = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "staging", "main"))
            .await
            .unwrap();

        h.deployer.approve(&h.ctx, change.number).await.unwrap();

        assert!(h
            .forge
            .file(&deployments(), "main", "generated/payments/staging/deployment.yaml")
            .is_some());
        assert!(!h.forge.has_branch(&deployments(), &change.branch));
        assert_eq!(
            h.forge.get_pr_sync(&deployments(), change.number).unwrap().state,
            PrState::Merged
        );
    }

    #[tokio::test]
    async fn cancel_closes_and_deletes_branch() {
        let h = harness(forge());
        let change = h
            .deployer
            .deploy(&h.ctx, deploy_request(&["payments"], "staging", "main"))
            .await
            .unwrap();

        h.deployer.cancel(&h.ctx, change.number).await.unwrap();

        assert!(!h.forge.has_branch(&deployments(), &change.branch));
        assert_eq!(
            h.forge.get_pr_sync(&deployments(), change.number).unwrap().state,
            PrState::Closed
        );
        assert!(h
            .forge
            .file(&deployments(), "main", "generated/payments/staging/deployment.yaml")
            .is_none());
    }

    #[tokio::test]
    async fn approving_merged_request_is_already_resolved() {
        let forge = forge().with_pr(
            &deployments(),
            PullRequest {
                number: 42,
                url: "https://github.com/acme/deployments/pull/42".to_string(),
                state: PrState::Merged,
                head: "releasegate/deploy-payments-prod".to_string(),
                base: "main".to_string(),
                title: "releasegate: Deploy payments to prod".to_string(),
                body: None,
            },
        );
        let h = harness(forge);

        let err = h.deployer.approve(&h.ctx, 42).await.unwrap_err();

        assert_eq!(
            validation(&err),
            &ValidationError::AlreadyResolved {
                number: 42,
                state: "merged".to_string()
            }
        );
        assert!(h.forge.operations().iter().any(|op| matches!(
            op,
            MockOperation::DeleteBranch { branch } if branch == "releasegate/deploy-payments-prod"
        )));
    }

    #[tokio::test]
    async fn missing_request_is_infrastructure() {
        let h = harness(forge());
        let err = h.deployer.approve(&h.ctx, 7).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(err.user_message().starts_with("Operation failed: "));
    }
}

mod status {
    use super::*;

    #[tokio::test]
    async fn one_snapshot_per_deployment_branch() {
        let forge = forge().with_branch(
            &deployments(),
            "main",
            [
                ("templates/payments/prod/deployment.yaml", TEMPLATE),
                ("templates/payments/prod/.freeze", "# frozen\n"),
            ],
        );
        let h = harness(forge);

        let report = h
            .deployer
            .list_service_environments_status(&h.ctx, &[])
            .await
            .unwrap();

        let downloads = h
            .forge
            .operations()
            .into_iter()
            .filter(|op| matches!(op, MockOperation::DownloadArchive { .. }))
            .count();
        assert_eq!(downloads, 2);
        assert!(h.forge.writes().is_empty());

        assert_eq!(report.len(), 4);
        let payments = &report["payments"];
        assert_eq!(payments[0].environment, "prod");
        assert!(payments[0].frozen);
        assert_eq!(payments[1].environment, "staging");
        assert!(!payments[1].frozen);
        assert!(!report["billing"][0].frozen);
    }

    #[tokio::test]
    async fn tags_expand_to_services() {
        let h = harness(forge());

        let report = h
            .deployer
            .list_service_environments_status(&h.ctx, &["core".to_string()])
            .await
            .unwrap();

        assert_eq!(
            report.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["ledger", "payments"]
        );
    }
}

mod execute {
    use super::*;

    #[tokio::test]
    async fn dispatches_every_operation() {
        let h = harness(forge());

        let outcome = h
            .deployer
            .execute(
                &h.ctx,
                Operation::ResolveCommit {
                    services: vec!["payments".to_string()],
                    reference: "main".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Commit(c) if Some(c.sha.clone()) == h.forge.branch_sha(&infra(), "main")));

        let outcome = h
            .deployer
            .execute(
                &h.ctx,
                Operation::Freeze(freeze_request(&["ledger"], "prod", FreezeAction::Unfreeze)),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Unchanged));

        let outcome = h
            .deployer
            .execute(&h.ctx, Operation::Deploy(deploy_request(&["ledger"], "prod", "main")))
            .await
            .unwrap();
        let number = match outcome {
            Outcome::Opened(change) => change.number,
            other => panic!("unexpected outcome {other:?}"),
        };

        let outcome = h
            .deployer
            .execute(&h.ctx, Operation::Cancel { number })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Cancelled { number: n } if n == number));

        let outcome = h.deployer.execute(&h.ctx, Operation::ListServices).await.unwrap();
        assert!(matches!(outcome, Outcome::Services(s) if s.len() == 4));

        let outcome = h
            .deployer
            .execute(
                &h.ctx,
                Operation::ListEnvironments {
                    service: "Payments".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Environments(e) if e.len() == 2));

        let outcome = h
            .deployer
            .execute(&h.ctx, Operation::Status { services: vec!["search".to_string()] })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Status(r) if r.contains_key("search")));
    }
}
