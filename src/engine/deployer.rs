//! engine::deployer
//!
//! The engine's public surface.
//!
//! # Deploy
//!
//! ```text
//! resolve services -> same repo / same branch -> resolve commit
//!   -> allowed branches -> snapshot -> frozen? -> working branch
//!   -> render + commit per service -> open change request
//! ```
//!
//! # Freeze / unfreeze
//!
//! Same, without commit resolution and rendering. When no environment
//! changes state no change request is opened and nothing is written.
//!
//! The working branch is only created once the snapshot has passed every
//! check, so a rejected request leaves the repository untouched. A failure
//! after that leaves the working branch as it is; the next attempt on the
//! same branch name starts over from the base branch.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn, Instrument};

use super::approval;
use super::command::{
    DeployRequest, EnvironmentStatus, FreezeRequest, Operation, Outcome, StatusReport,
};
use super::error::{DeployError, ForgeResultExt, ValidationError};
use super::freeze::{self, FreezeAction};
use super::render::{self, TemplateVars};
use super::resolver;
use super::transaction;
use super::workspace::Workspace;
use super::{ChangeKind, ChangeRequest, Context};
use crate::core::config::{EngineConfig, Environment, Service};
use crate::core::naming::{self, BRANCH_PREFIX};
use crate::core::registry::ServiceRegistry;
use crate::core::types::{BranchName, Identity, Oid, RepoSlug};
use crate::core::validate::{shared_repository, validate_targets};
use crate::forge::{Forge, ResolvedCommit};

/// Deploys services and manages freezes on one deployment repository.
///
/// Holds only immutable data and a shared forge handle; one instance serves
/// any number of concurrent operations.
pub struct Deployer {
    registry: ServiceRegistry,
    forge: Arc<dyn Forge>,
    deployment_repo: RepoSlug,
    default_branch: Option<BranchName>,
    committer: Identity,
    scratch_dir: PathBuf,
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("forge", &self.forge.name())
            .field("deployment_repo", &self.deployment_repo)
            .field("default_branch", &self.default_branch)
            .field("services", &self.registry.services().len())
            .finish()
    }
}

impl Deployer {
    /// Build a deployer without touching the network.
    ///
    /// Without `github.default_branch` in the config, operations that need
    /// the default branch ask the forge for it each time.
    ///
    /// The config is validated first, so settings built in code get the same
    /// checks as a loaded file.
    pub fn new(config: &EngineConfig, forge: Arc<dyn Forge>) -> Result<Self, DeployError> {
        config.validate()?;
        Ok(Self {
            registry: ServiceRegistry::new(config.services.clone()),
            forge,
            deployment_repo: config.github.deployment_repo()?,
            default_branch: config.github.default_branch()?,
            committer: config.github.committer(),
            scratch_dir: config.scratch_dir(),
        })
    }

    /// Pin the deployment repository's default branch.
    pub fn with_default_branch(mut self, branch: BranchName) -> Self {
        self.default_branch = Some(branch);
        self
    }

    /// Build a deployer and pin the default branch reported by the forge.
    pub async fn connect(config: &EngineConfig, forge: Arc<dyn Forge>) -> Result<Self, DeployError> {
        let deployer = Self::new(config, forge)?;
        let branch = deployer.fetch_default_branch().await?;
        debug!(repo = %deployer.deployment_repo, default_branch = %branch, "connected");
        Ok(deployer.with_default_branch(branch))
    }

    pub fn deployment_repo(&self) -> &RepoSlug {
        &self.deployment_repo
    }

    /// The pinned default branch, if known.
    pub fn default_branch(&self) -> Option<&BranchName> {
        self.default_branch.as_ref()
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Expand tags into service names for display; input on failure.
    pub fn resolve_tags(&self, names: &[String]) -> Vec<String> {
        self.registry.resolve_tags(names)
    }

    pub fn list_services(&self) -> &[Service] {
        self.registry.services()
    }

    pub fn list_environments(&self, service: &str) -> Result<&[Environment], DeployError> {
        Ok(self.registry.lookup_service(service)?.environments.as_slice())
    }

    /// Resolve `reference` in the shared source repository of `services`.
    pub async fn get_commit_sha(
        &self,
        ctx: &Context,
        services: &[String],
        reference: &str,
    ) -> Result<ResolvedCommit, DeployError> {
        self.resolve_commit(services, reference)
            .instrument(ctx.span().clone())
            .await
    }

    /// Render and commit manifests for every requested service, then open a
    /// change request.
    ///
    /// A change request is opened even when the rendered output matches what
    /// is already deployed; its diff is then empty.
    pub async fn deploy(&self, ctx: &Context, request: DeployRequest) -> Result<ChangeRequest, DeployError> {
        self.run_deploy(request).instrument(ctx.span().clone()).await
    }

    /// Freeze or unfreeze the requested services.
    ///
    /// Returns `None` when every environment was already in the requested
    /// state.
    pub async fn freeze(
        &self,
        ctx: &Context,
        request: FreezeRequest,
    ) -> Result<Option<ChangeRequest>, DeployError> {
        self.run_freeze(request).instrument(ctx.span().clone()).await
    }

    /// Merge change request `number`.
    pub async fn approve(&self, ctx: &Context, number: u64) -> Result<(), DeployError> {
        approval::approve(self.forge.as_ref(), &self.deployment_repo, number)
            .instrument(ctx.span().clone())
            .await
    }

    /// Close change request `number` without merging.
    pub async fn cancel(&self, ctx: &Context, number: u64) -> Result<(), DeployError> {
        approval::cancel(self.forge.as_ref(), &self.deployment_repo, number)
            .instrument(ctx.span().clone())
            .await
    }

    /// Freeze state of every environment of the named services (all services
    /// when `names` is empty). One snapshot is downloaded per distinct
    /// deployment branch.
    pub async fn list_service_environments_status(
        &self,
        ctx: &Context,
        names: &[String],
    ) -> Result<StatusReport, DeployError> {
        self.collect_status(names).instrument(ctx.span().clone()).await
    }

    /// Run any operation.
    pub async fn execute(&self, ctx: &Context, operation: Operation) -> Result<Outcome, DeployError> {
        debug!(parent: ctx.span(), operation = operation.name(), "executing");
        match operation {
            Operation::ResolveCommit {
                services,
                reference,
            } => self
                .get_commit_sha(ctx, &services, &reference)
                .await
                .map(Outcome::Commit),
            Operation::Deploy(request) => self.deploy(ctx, request).await.map(Outcome::Opened),
            Operation::Freeze(request) => Ok(match self.freeze(ctx, request).await? {
                Some(change) => Outcome::Opened(change),
                None => Outcome::Unchanged,
            }),
            Operation::Approve { number } => self
                .approve(ctx, number)
                .await
                .map(|()| Outcome::Approved { number }),
            Operation::Cancel { number } => self
                .cancel(ctx, number)
                .await
                .map(|()| Outcome::Cancelled { number }),
            Operation::ListServices => Ok(Outcome::Services(self.list_services().to_vec())),
            Operation::ListEnvironments { service } => self
                .list_environments(&service)
                .map(|envs| Outcome::Environments(envs.to_vec())),
            Operation::Status { services } => self
                .list_service_environments_status(ctx, &services)
                .await
                .map(Outcome::Status),
        }
    }

    async fn resolve_commit(
        &self,
        services: &[String],
        reference: &str,
    ) -> Result<ResolvedCommit, DeployError> {
        let services = self.registry.lookup_services(services)?;
        let source = shared_repository(&services)?;
        resolver::get_commit_sha(self.forge.as_ref(), &source, reference).await
    }

    async fn run_deploy(&self, request: DeployRequest) -> Result<ChangeRequest, DeployError> {
        info!(
            services = ?request.services,
            environment = %request.environment,
            reference = %request.reference,
            "deploy requested"
        );

        let targets = self.targets(&request.services, &request.environment)?;
        let base = validate_targets(&targets)?;
        let services: Vec<&Service> = targets.iter().map(|(s, _)| *s).collect();
        let source = shared_repository(&services)?;

        let commit = match &request.commit_url {
            Some(url) => ResolvedCommit {
                sha: Oid::new(request.reference.trim()).map_err(|_| {
                    ValidationError::UnknownCommit {
                        repo: source.to_string(),
                        reference: request.reference.clone(),
                    }
                })?,
                url: url.clone(),
            },
            None => resolver::get_commit_sha(self.forge.as_ref(), &source, &request.reference).await?,
        };
        self.check_allowed_branches(&source, &commit, &targets).await?;

        let names = service_names(&targets);
        let environment = environment_name(&targets, &request.environment);
        let work = working_branch("deploy", &names, &environment)?;
        let default_branch = self.resolve_default_branch().await?;

        let mut workspace = Workspace::snapshot(
            self.forge.as_ref(),
            &self.deployment_repo,
            &default_branch,
            base,
            &self.scratch_dir,
        )
        .await?;

        for (service, env) in &targets {
            if freeze::is_frozen(workspace.root(), env.freeze_dir()) {
                return Err(ValidationError::Frozen {
                    service: service.name.clone(),
                    environment: env.name.clone(),
                }
                .into());
            }
        }
        workspace.branch(self.forge.as_ref(), &work).await?;

        let short = commit.sha.short(7).to_string();
        for (service, env) in &targets {
            let output = render::render(
                workspace.root(),
                env,
                &TemplateVars {
                    service_name: service.name.clone(),
                    environment: env.name.clone(),
                    version: commit.sha.to_string(),
                },
            )?;
            let message = deploy_message(&service.name, &env.name, &short, &request.author.name);
            let outcome = transaction::commit_files(
                self.forge.as_ref(),
                &mut workspace,
                &output.changed_paths(),
                &request.author,
                &self.committer,
                &message,
            )
            .await?;
            if !outcome.tree_changed {
                info!(service = %service.name, "rendered output unchanged");
            }
        }

        let joined = names.join(", ");
        let title = deploy_message(&joined, &environment, &short, &request.author.name);
        let description = format!(
            "Service Name: {}\nEnvironment: {}\nCommit: [{}]({})\nRequested by: {}",
            joined, environment, short, commit.url, request.author.name
        );
        let opened = approval::open(
            self.forge.as_ref(),
            &self.deployment_repo,
            &title,
            &description,
            workspace.base_branch(),
            &work,
        )
        .await?;

        let change = ChangeRequest {
            kind: ChangeKind::Deploy,
            services: names,
            environment,
            branch: work.to_string(),
            base_branch: workspace.base_branch().to_string(),
            number: opened.number,
            url: opened.url,
            diff: opened.diff,
        };
        release(workspace);
        Ok(change)
    }

    async fn run_freeze(&self, request: FreezeRequest) -> Result<Option<ChangeRequest>, DeployError> {
        let action = request.action;
        info!(
            services = ?request.services,
            environment = %request.environment,
            %action,
            "freeze requested"
        );

        let targets = self.targets(&request.services, &request.environment)?;
        let base = validate_targets(&targets)?;

        let names = service_names(&targets);
        let environment = environment_name(&targets, &request.environment);
        let work = working_branch(action.verb(), &names, &environment)?;
        let default_branch = self.resolve_default_branch().await?;

        let mut workspace = Workspace::snapshot(
            self.forge.as_ref(),
            &self.deployment_repo,
            &default_branch,
            base,
            &self.scratch_dir,
        )
        .await?;

        let mut changed = Vec::new();
        for (service, env) in &targets {
            let change = freeze::apply(workspace.root(), env.freeze_dir(), action)?;
            debug!(service = %service.name, path = %change.path, changed = change.changed, "applied");
            if change.changed {
                changed.push((service.name.as_str(), change.path));
            }
        }

        if changed.is_empty() {
            info!(%action, "already in requested state, nothing to commit");
            release(workspace);
            return Ok(None);
        }
        workspace.branch(self.forge.as_ref(), &work).await?;

        let joined = names.join(", ");
        let verb = match action {
            FreezeAction::Freeze => "Freeze",
            FreezeAction::Unfreeze => "Unfreeze",
        };
        for (service, path) in changed {
            let message = freeze_message(verb, service, &environment, &request.author.name);
            transaction::commit_files(
                self.forge.as_ref(),
                &mut workspace,
                &[path],
                &request.author,
                &self.committer,
                &message,
            )
            .await?;
        }

        let title = freeze_message(verb, &joined, &environment, &request.author.name);
        let description = format!(
            "Service Name: {}\nEnvironment: {}\nAction: {}\nRequested by: {}",
            joined, environment, action, request.author.name
        );
        let opened = approval::open(
            self.forge.as_ref(),
            &self.deployment_repo,
            &title,
            &description,
            workspace.base_branch(),
            &work,
        )
        .await?;

        let change = ChangeRequest {
            kind: ChangeKind::from(action),
            services: names,
            environment,
            branch: work.to_string(),
            base_branch: workspace.base_branch().to_string(),
            number: opened.number,
            url: opened.url,
            diff: opened.diff,
        };
        release(workspace);
        Ok(Some(change))
    }

    async fn collect_status(&self, names: &[String]) -> Result<StatusReport, DeployError> {
        let services: Vec<&Service> = if names.is_empty() {
            self.registry.services().iter().collect()
        } else {
            self.registry.lookup_services(names)?
        };

        let default_branch = self.resolve_default_branch().await?;
        let mut snapshots: BTreeMap<&str, Workspace> = BTreeMap::new();
        for env in services.iter().flat_map(|s| s.environments.iter()) {
            let branch = env
                .deployment_branch()
                .unwrap_or(default_branch.as_str());
            if snapshots.contains_key(branch) {
                continue;
            }
            let workspace = Workspace::snapshot(
                self.forge.as_ref(),
                &self.deployment_repo,
                &default_branch,
                Some(branch),
                &self.scratch_dir,
            )
            .await?;
            snapshots.insert(branch, workspace);
        }
        debug!(snapshots = snapshots.len(), "collected snapshots");

        let mut report = StatusReport::new();
        for service in &services {
            let statuses = service
                .environments
                .iter()
                .filter_map(|env| {
                    let branch = env
                        .deployment_branch()
                        .unwrap_or(default_branch.as_str());
                    snapshots.get(branch).map(|ws| EnvironmentStatus {
                        environment: env.name.clone(),
                        frozen: freeze::is_frozen(ws.root(), env.freeze_dir()),
                    })
                })
                .collect();
            report.insert(service.name.clone(), statuses);
        }

        for workspace in snapshots.into_values() {
            release(workspace);
        }
        Ok(report)
    }

    async fn fetch_default_branch(&self) -> Result<BranchName, DeployError> {
        let info = self
            .forge
            .get_repository(&self.deployment_repo)
            .await
            .during("read deployment repository")?;
        Ok(info.default_branch)
    }

    async fn resolve_default_branch(&self) -> Result<BranchName, DeployError> {
        match &self.default_branch {
            Some(branch) => Ok(branch.clone()),
            None => self.fetch_default_branch().await,
        }
    }

    fn targets(
        &self,
        names: &[String],
        environment: &str,
    ) -> Result<Vec<(&Service, &Environment)>, ValidationError> {
        self.registry
            .lookup_services(names)?
            .into_iter()
            .map(|service| {
                self.registry
                    .lookup_environment(service, environment)
                    .map(|env| (service, env))
            })
            .collect()
    }

    /// Reject the commit unless every environment's allowed branches contain
    /// it. Environments without a restriction pass.
    async fn check_allowed_branches(
        &self,
        source: &RepoSlug,
        commit: &ResolvedCommit,
        targets: &[(&Service, &Environment)],
    ) -> Result<(), DeployError> {
        let mut checked: BTreeSet<Vec<&str>> = BTreeSet::new();
        for (_, env) in targets {
            let allowed = env.allowed_branches();
            if allowed.is_empty() || !checked.insert(allowed.clone()) {
                continue;
            }
            let found = resolver::validate_branch(
                self.forge.as_ref(),
                source,
                commit.sha.as_str(),
                &allowed,
            )
            .await?;
            if !found {
                return Err(ValidationError::CommitNotInAllowedBranches {
                    commit: commit.sha.short(7).to_string(),
                    branches: allowed.iter().map(|b| b.to_string()).collect(),
                }
                .into());
            }
        }
        Ok(())
    }
}

fn deploy_message(services: &str, environment: &str, short_sha: &str, requester: &str) -> String {
    format!(
        "{}: Deploy {} to {} commit {} triggered by {}",
        BRANCH_PREFIX, services, environment, short_sha, requester
    )
}

fn freeze_message(verb: &str, services: &str, environment: &str, requester: &str) -> String {
    format!(
        "{}: {} {} in {} triggered by {}",
        BRANCH_PREFIX, verb, services, environment, requester
    )
}

fn service_names(targets: &[(&Service, &Environment)]) -> Vec<String> {
    targets.iter().map(|(s, _)| s.name.clone()).collect()
}

/// Configured spelling of the environment, falling back to the request's.
fn environment_name(targets: &[(&Service, &Environment)], requested: &str) -> String {
    targets
        .first()
        .map(|(_, e)| e.name.clone())
        .unwrap_or_else(|| requested.to_string())
}

fn working_branch(action: &str, names: &[String], environment: &str) -> Result<BranchName, DeployError> {
    naming::working_branch(action, names, environment)
        .map_err(|e| ValidationError::InvalidBranch(e.to_string()).into())
}

fn release(workspace: Workspace) {
    let root = workspace.root().to_path_buf();
    if let Err(e) = workspace.close() {
        warn!(path = %root.display(), error = %e, "failed to remove staging directory");
    }
}
