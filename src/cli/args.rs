//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this config file instead of searching
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--json`: Machine-readable output
//! - `--as <name>` / `--email <email>`: Requester identity recorded on commits

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// releasegate - render, commit and gate deployments through the GitHub API
#[derive(Parser, Debug)]
#[command(name = "releasegate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: searched, see `releasegate --help`)
    #[arg(long, global = true, env = "RELEASEGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Name of the person making the request
    #[arg(long = "as", global = true, env = "RELEASEGATE_REQUESTER", value_name = "NAME")]
    pub requester: Option<String>,

    /// Email of the person making the request
    #[arg(long, global = true, env = "RELEASEGATE_EMAIL")]
    pub email: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render and commit manifests, then open a change request
    #[command(
        name = "deploy",
        long_about = "Render the deployment manifests of one or more services for an \
            environment and open a change request against the deployment repository.\n\n\
            SERVICES is a comma-separated list of service names or tags. All services \
            must come from the same source repository and deploy from the same branch. \
            REF is a branch, tag or commit sha in that source repository.",
        after_help = "\
EXAMPLES:
    # Deploy the head of main
    releasegate deploy payments prod main

    # Deploy everything tagged 'core' at a tag
    releasegate deploy core staging v1.4.2

    # Then approve the change request it printed
    releasegate approve 42"
    )]
    Deploy {
        /// Comma-separated service names or tags
        services: String,

        /// Target environment
        environment: String,

        /// Branch, tag or sha to deploy
        #[arg(value_name = "REF")]
        reference: String,
    },

    /// Block deployments to an environment
    #[command(
        name = "freeze",
        long_about = "Freeze an environment for one or more services. A frozen environment \
            rejects deployments until it is unfrozen. The freeze itself goes through a \
            change request; nothing is opened if every environment is already frozen."
    )]
    Freeze {
        /// Comma-separated service names or tags
        services: String,

        /// Environment to freeze
        environment: String,
    },

    /// Allow deployments to a frozen environment again
    #[command(name = "unfreeze")]
    Unfreeze {
        /// Comma-separated service names or tags
        services: String,

        /// Environment to unfreeze
        environment: String,
    },

    /// Merge a change request and delete its branch
    #[command(name = "approve")]
    Approve {
        /// Change request number
        number: u64,
    },

    /// Close a change request without merging
    #[command(name = "cancel", visible_alias = "deny")]
    Cancel {
        /// Change request number
        number: u64,
    },

    /// Show the freeze status of services
    #[command(
        name = "list",
        visible_alias = "status",
        after_help = "\
EXAMPLES:
    # All services
    releasegate list

    # Only some services or tags
    releasegate list payments,core"
    )]
    List {
        /// Comma-separated service names or tags (default: all)
        services: Option<String>,
    },

    /// List configured services
    #[command(name = "services")]
    Services,

    /// List the environments of a service
    #[command(name = "environments", visible_alias = "envs")]
    Environments {
        /// Service name
        service: String,
    },

    /// List tags and their services
    #[command(name = "tags")]
    Tags,

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    # Bash
    releasegate completion bash > ~/.local/share/bash-completion/completions/releasegate

    # Zsh
    releasegate completion zsh > ~/.zfunc/_releasegate

    # Fish
    releasegate completion fish > ~/.config/fish/completions/releasegate.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the version
    #[command(name = "version")]
    Version,
}

impl Command {
    /// Whether the command needs a loaded config.
    pub fn needs_config(&self) -> bool {
        !matches!(self, Command::Completion { .. } | Command::Version)
    }
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
