//! cli::commands::approve
//!
//! Resolve a pending change request.

use anyhow::Result;
use serde_json::json;

use super::{emit, unexpected, App};
use crate::engine::{Operation, Outcome};

/// Merge change request `number` and delete its branch.
pub fn approve(app: &App, number: u64) -> Result<()> {
    match app.execute(Operation::Approve { number })? {
        Outcome::Approved { number } => emit(
            app,
            &json!({ "number": number, "state": "merged" }),
            || format!("Merged change request #{}.", number),
        ),
        other => Err(unexpected(other)),
    }
}

/// Close change request `number` without merging.
pub fn cancel(app: &App, number: u64) -> Result<()> {
    match app.execute(Operation::Cancel { number })? {
        Outcome::Cancelled { number } => emit(
            app,
            &json!({ "number": number, "state": "closed" }),
            || format!("Closed change request #{}.", number),
        ),
        other => Err(unexpected(other)),
    }
}
