//! cli::commands::list
//!
//! Read-only views of the catalog.

use anyhow::Result;

use super::{emit, unexpected, App};
use crate::core::config::Service;
use crate::core::registry::parse_service_list;
use crate::engine::{Operation, Outcome};
use crate::ui::format;

/// Freeze status of `services` (names or tags), or of every service.
pub fn status(app: &App, services: Option<&str>) -> Result<()> {
    let names = services.map(parse_service_list).unwrap_or_default();

    let report = match app.execute(Operation::Status {
        services: names.clone(),
    })? {
        Outcome::Status(report) => report,
        other => return Err(unexpected(other)),
    };

    let registry = app.deployer().registry();
    let order: Vec<&Service> = if names.is_empty() {
        registry.services().iter().collect()
    } else {
        registry.lookup_services(&names).unwrap_or_default()
    };
    emit(app, &report, || format::status(&report, &order))
}

/// Every configured service.
pub fn services(app: &App) -> Result<()> {
    match app.execute(Operation::ListServices)? {
        Outcome::Services(services) => emit(app, &services, || format::services(&services)),
        other => Err(unexpected(other)),
    }
}

/// Environments of one service.
pub fn environments(app: &App, service: &str) -> Result<()> {
    let operation = Operation::ListEnvironments {
        service: service.to_string(),
    };
    match app.execute(operation)? {
        Outcome::Environments(envs) => emit(app, &envs, || format::environments(&envs)),
        other => Err(unexpected(other)),
    }
}

/// Tags and the services carrying them.
pub fn tags(app: &App) -> Result<()> {
    let tags = app.deployer().registry().tags();
    emit(app, &tags, || format::tags(&tags))
}
