//! cli::commands::freeze
//!
//! Toggle the freeze marker through a change request.

use anyhow::Result;
use serde_json::json;

use super::{emit, unexpected, App};
use crate::core::registry::parse_service_list;
use crate::engine::{FreezeAction, FreezeRequest, Operation, Outcome};
use crate::ui::format;

/// Apply `action` to `environment` of every service in `services`.
///
/// Prints a notice instead of a change request when every environment is
/// already in the target state.
pub fn run(app: &App, action: FreezeAction, services: &str, environment: &str) -> Result<()> {
    let request = FreezeRequest {
        services: parse_service_list(services),
        environment: environment.to_string(),
        action,
        author: app.author().clone(),
    };

    match app.execute(Operation::Freeze(request))? {
        Outcome::Opened(change) => emit(app, &change, || format::change_request(&change)),
        Outcome::Unchanged => emit(
            app,
            &json!({ "changed": false, "action": action, "environment": environment }),
            || {
                format!(
                    "{} is already {}, nothing to do.",
                    environment,
                    action.target().to_string().to_lowercase()
                )
            },
        ),
        other => Err(unexpected(other)),
    }
}
