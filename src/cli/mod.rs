//! cli
//!
//! Command-line front end for the release engine.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and set up logging
//! - Map subcommands onto engine operations and print the outcome
//!
//! # Architecture
//!
//! The CLI layer is thin. Everything that touches the deployment repository
//! is an [`crate::engine::Operation`] run through
//! [`crate::engine::Deployer::execute`].

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::{Context as _, Result};
use tracing_subscriber::EnvFilter;

use crate::core::config::Config;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    if !cli.command.needs_config() {
        init_tracing(None, cli.debug);
        return commands::dispatch_standalone(cli.command);
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(Some(config.log_filter()), cli.debug);
    tracing::debug!(path = %config.loaded_from().display(), "loaded configuration");

    let app = commands::App::new(&cli, &config)?;
    commands::dispatch(cli.command, &app)
}

/// Install the global subscriber, logging to stderr.
///
/// `--debug` wins over `RUST_LOG`, which wins over the config's filter.
fn init_tracing(config_filter: Option<&str>, debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config_filter.unwrap_or("warn")))
    };

    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
