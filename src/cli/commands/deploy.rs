//! cli::commands::deploy
//!
//! Render manifests and open a change request.

use anyhow::Result;

use super::{emit, unexpected, App};
use crate::core::registry::parse_service_list;
use crate::engine::{DeployRequest, Operation, Outcome};
use crate::ui::format;

/// Deploy `services` (names or tags) to `environment` at `reference`.
pub fn deploy(app: &App, services: &str, environment: &str, reference: &str) -> Result<()> {
    let request = DeployRequest {
        services: parse_service_list(services),
        environment: environment.to_string(),
        reference: reference.to_string(),
        commit_url: None,
        author: app.author().clone(),
    };

    match app.execute(Operation::Deploy(request))? {
        Outcome::Opened(change) => emit(app, &change, || format::change_request(&change)),
        other => Err(unexpected(other)),
    }
}
