//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Turns its arguments into an engine [`Operation`]
//! 2. Runs it through [`Deployer::execute`]
//! 3. Formats and displays the [`Outcome`]
//!
//! Handlers do NOT talk to the forge directly.
//!
//! # Async Commands
//!
//! Every engine operation is async. [`App::execute`] drives it to
//! completion on a current-thread runtime owned by the [`App`].

mod approve;
mod completion;
mod deploy;
mod freeze;
mod list;
mod version;

use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use tracing::{debug, error};

use crate::auth::EnvTokenProvider;
use crate::cli::args::{Cli, Command};
use crate::core::config::Config;
use crate::core::types::Identity;
use crate::engine::{Context, Deployer, ErrorKind, FreezeAction, Operation, Outcome};
use crate::forge::github::{GitHubForge, DEFAULT_API_BASE};
use crate::ui::output::{self, Verbosity};

/// Everything a handler needs to run one request.
pub struct App {
    deployer: Deployer,
    ctx: Context,
    author: Identity,
    verbosity: Verbosity,
    json: bool,
    runtime: tokio::runtime::Runtime,
}

impl App {
    /// Build the forge, deployer and request context from flags and config.
    ///
    /// Makes no network calls.
    pub fn new(cli: &Cli, config: &Config) -> Result<Self> {
        let settings = &config.settings;
        let provider = Arc::new(EnvTokenProvider::new(settings.github.token_env()));
        let api_base = settings
            .github
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE);
        let forge = GitHubForge::with_api_base(provider, api_base);
        let deployer = Deployer::new(settings, Arc::new(forge))?;

        let requester = cli
            .requester
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let email = cli
            .email
            .clone()
            .unwrap_or_else(|| settings.github.author_email.clone());
        let author = Identity::new(requester.clone(), email);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;

        Ok(Self {
            deployer,
            ctx: Context::new(requester),
            author,
            verbosity: Verbosity::from_flags(cli.quiet),
            json: cli.json,
            runtime,
        })
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    pub fn author(&self) -> &Identity {
        &self.author
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn json(&self) -> bool {
        self.json
    }

    /// Run `operation` and turn engine errors into their user-facing message.
    ///
    /// Infrastructure failures are logged in full before being shortened.
    pub fn execute(&self, operation: Operation) -> Result<Outcome> {
        let name = operation.name();
        debug!(operation = name, request_id = %self.ctx.request_id, "executing");

        self.runtime
            .block_on(self.deployer.execute(&self.ctx, operation))
            .map_err(|err| {
                match err.kind() {
                    ErrorKind::Infrastructure => {
                        error!(operation = name, request_id = %self.ctx.request_id, error = %err, "operation failed")
                    }
                    ErrorKind::Validation => {
                        debug!(operation = name, error = %err, "request rejected")
                    }
                }
                anyhow!(err.user_message())
            })
    }
}

/// Dispatch a command that needs no config.
pub fn dispatch_standalone(command: Command) -> Result<()> {
    match command {
        Command::Completion { shell } => completion::completion(shell),
        Command::Version => version::version(),
        other => Err(anyhow!("`{}` needs a configuration", command_name(&other))),
    }
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, app: &App) -> Result<()> {
    match command {
        Command::Deploy {
            services,
            environment,
            reference,
        } => deploy::deploy(app, &services, &environment, &reference),
        Command::Freeze {
            services,
            environment,
        } => freeze::run(app, FreezeAction::Freeze, &services, &environment),
        Command::Unfreeze {
            services,
            environment,
        } => freeze::run(app, FreezeAction::Unfreeze, &services, &environment),
        Command::Approve { number } => approve::approve(app, number),
        Command::Cancel { number } => approve::cancel(app, number),
        Command::List { services } => list::status(app, services.as_deref()),
        Command::Services => list::services(app),
        Command::Environments { service } => list::environments(app, &service),
        Command::Tags => list::tags(app),
        Command::Completion { shell } => completion::completion(shell),
        Command::Version => version::version(),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Deploy { .. } => "deploy",
        Command::Freeze { .. } => "freeze",
        Command::Unfreeze { .. } => "unfreeze",
        Command::Approve { .. } => "approve",
        Command::Cancel { .. } => "cancel",
        Command::List { .. } => "list",
        Command::Services => "services",
        Command::Environments { .. } => "environments",
        Command::Tags => "tags",
        Command::Completion { .. } => "completion",
        Command::Version => "version",
    }
}

/// Print a JSON value when `--json` is set, otherwise the text.
fn emit<T: serde::Serialize>(app: &App, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if app.json() {
        output::json(value).context("failed to encode output")?;
    } else {
        output::print(text(), app.verbosity());
    }
    Ok(())
}

/// Error for an outcome the operation never produces.
fn unexpected(outcome: Outcome) -> anyhow::Error {
    anyhow!("unexpected engine outcome: {:?}", outcome)
}
