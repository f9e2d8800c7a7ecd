//! core::registry
//!
//! Service catalog lookups.
//!
//! Requests name services loosely: any mix of service names and tags,
//! case-insensitive. The registry turns that into a concrete, de-duplicated
//! list of catalog entries in a stable order.
//!
//! # Example
//!
//! ```
//! use releasegate::core::config::{Environment, Service};
//! use releasegate::core::registry::ServiceRegistry;
//!
//! let env = Environment {
//!     name: "prod".into(),
//!     template_path: "t".into(),
//!     generated_path: "g".into(),
//!     allowed_branches: vec![],
//!     deployment_branch: None,
//!     freeze_file_path: None,
//! };
//! let registry = ServiceRegistry::new(vec![Service {
//!     name: "payments".into(),
//!     organization: "acme".into(),
//!     repository: "payments".into(),
//!     tags: vec!["core".into()],
//!     environments: vec![env],
//! }]);
//!
//! let found = registry.lookup_services(&["CORE".to_string()]).unwrap();
//! assert_eq!(found[0].name, "payments");
//! ```

use std::collections::HashSet;

use super::config::{Environment, Service};
use super::validate::ValidationError;

/// Immutable service catalog.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<Service>,
}

impl ServiceRegistry {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    /// All services in config order.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Case-insensitive lookup of a single service by name.
    pub fn lookup_service(&self, name: &str) -> Result<&Service, ValidationError> {
        self.services
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ValidationError::ServiceNotFound(name.to_string()))
    }

    /// Resolve names and tags to services.
    ///
    /// Each token matches a service name first, then a tag; a tag expands to
    /// all services carrying it, in config order. The result is
    /// de-duplicated by service name, keeping first occurrences.
    ///
    /// # Errors
    ///
    /// `ServiceNotFound` for the first token matching nothing, `NoServices`
    /// when the input is empty.
    pub fn lookup_services(&self, names: &[String]) -> Result<Vec<&Service>, ValidationError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for token in names {
            let matches = self.match_token(token);
            if matches.is_empty() {
                return Err(ValidationError::ServiceNotFound(token.clone()));
            }
            for service in matches {
                if seen.insert(service.name.to_ascii_lowercase()) {
                    found.push(service);
                }
            }
        }

        if found.is_empty() {
            return Err(ValidationError::NoServices);
        }
        Ok(found)
    }

    fn match_token(&self, token: &str) -> Vec<&Service> {
        let token = token.trim();
        if let Some(service) = self
            .services
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(token))
        {
            return vec![service];
        }
        self.services
            .iter()
            .filter(|s| s.tags.iter().any(|t| t.eq_ignore_ascii_case(token)))
            .collect()
    }

    /// Case-insensitive lookup of one environment of a service.
    pub fn lookup_environment<'a>(
        &self,
        service: &'a Service,
        name: &str,
    ) -> Result<&'a Environment, ValidationError> {
        service
            .environments
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ValidationError::EnvironmentNotFound {
                service: service.name.clone(),
                environment: name.to_string(),
            })
    }

    /// Expand tags to service names for display. Falls back to the input
    /// unchanged if anything fails to resolve.
    pub fn resolve_tags(&self, names: &[String]) -> Vec<String> {
        match self.lookup_services(names) {
            Ok(services) => services.into_iter().map(|s| s.name.clone()).collect(),
            Err(_) => names.to_vec(),
        }
    }

    /// All distinct tags, sorted, with the services carrying each.
    pub fn tags(&self) -> Vec<(String, Vec<&str>)> {
        let mut tags: Vec<String> = Vec::new();
        for service in &self.services {
            for tag in &service.tags {
                if !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                    tags.push(tag.clone());
                }
            }
        }
        tags.sort_by_key(|t| t.to_ascii_lowercase());

        tags.into_iter()
            .map(|tag| {
                let members = self
                    .services
                    .iter()
                    .filter(|s| s.tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)))
                    .map(|s| s.name.as_str())
                    .collect();
                (tag, members)
            })
            .collect()
    }
}

/// Split a comma-separated service list: trimmed, blanks dropped,
/// duplicates removed keeping first occurrences.
///
/// ```
/// use releasegate::core::registry::parse_service_list;
///
/// assert_eq!(parse_service_list("a, b,a,,"), vec!["a", "b"]);
/// ```
pub fn parse_service_list(input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(String::from)
        .collect()
}
