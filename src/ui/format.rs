//! ui::format
//!
//! Text rendering of engine results.

use crate::core::config::{Environment, Service};
use crate::engine::approval::truncate_diff;
use crate::engine::{ChangeRequest, StatusReport};

/// Summary of an opened change request, with its diff shortened for display.
pub fn change_request(change: &ChangeRequest) -> String {
    format!(
        "Opened change request #{number} ({kind} {services} to {environment})\n\
         {url}\n\
         branch: {branch} -> {base}\n\
         \n\
         {diff}\n\
         \n\
         Approve with `releasegate approve {number}` or cancel with `releasegate cancel {number}`.",
        number = change.number,
        kind = change.kind,
        services = change.services.join(", "),
        environment = change.environment,
        url = change.url,
        branch = change.branch,
        base = change.base_branch,
        diff = truncate_diff(&change.diff),
    )
}

/// Freeze status per service, in the order of `order`, with tags.
///
/// Services missing from the report are skipped.
pub fn status(report: &StatusReport, order: &[&Service]) -> String {
    let mut blocks = Vec::new();
    for service in order {
        let Some(statuses) = report.get(&service.name) else {
            continue;
        };
        let mut block = vec![service.name.clone()];
        block.extend(
            statuses
                .iter()
                .map(|s| format!("  {}: {}", s.environment, s.state())),
        );
        if !service.tags.is_empty() {
            block.push(format!("  Tags: {}", service.tags.join(", ")));
        }
        blocks.push(block.join("\n"));
    }
    blocks.join("\n\n")
}

/// One line per service: name, source repository and tags.
pub fn services(services: &[Service]) -> String {
    services
        .iter()
        .map(|s| {
            let tags = if s.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", s.tags.join(", "))
            };
            format!("{} ({}/{}){}", s.name, s.organization, s.repository, tags)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn environments(environments: &[Environment]) -> String {
    environments
        .iter()
        .map(|e| {
            let branch = e.deployment_branch().unwrap_or("<default>");
            let allowed = e.allowed_branches();
            let allowed = if allowed.is_empty() {
                "any".to_string()
            } else {
                allowed.join(", ")
            };
            format!(
                "{}: {} -> {} (branch: {}, allowed: {})",
                e.name, e.template_path, e.generated_path, branch, allowed
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn tags(tags: &[(String, Vec<&str>)]) -> String {
    tags.iter()
        .map(|(tag, members)| format!("{}: {}", tag, members.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}
