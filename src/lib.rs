//! releasegate - A chat-driven GitOps release engine
//!
//! releasegate renders deployment manifests for a service and environment,
//! commits them to a deployment repository entirely through the GitHub API,
//! and gates the change behind a pull request that a human approves or
//! cancels. Environments can be frozen to block deployments.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Deploy, freeze, approval and status operations
//! - [`core`] - Domain types, configuration, service registry and validation
//! - [`forge`] - Hosting API primitives (GitHub, plus an in-memory mock)
//! - [`auth`] - Bearer token providers for the forge
//! - [`ui`] - Terminal output
//!
//! # Correctness Invariants
//!
//! 1. Every request is validated in full before the first remote write
//! 2. No change lands on a deployment branch without an approved change request
//! 3. The deployment repository is never cloned; only archive snapshots are read
//! 4. A working branch is deleted once its change request is resolved

pub mod auth;
pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
pub mod ui;
