//! core
//!
//! Core domain types, schemas, and request validation for releasegate.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RepoSlug, etc.
//! - [`naming`] - Working-branch naming rules
//! - [`config`] - Configuration schema and loading
//! - [`registry`] - Service catalog lookups (names, tags, environments)
//! - [`validate`] - Validation errors and cross-service consistency checks
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Nothing in this layer touches the network

pub mod config;
pub mod naming;
pub mod registry;
pub mod types;
pub mod validate;
