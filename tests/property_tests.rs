//! Property-based tests for request parsing and service resolution.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use std::collections::HashSet;

use proptest::prelude::*;

use releasegate::core::config::{Environment, Service};
use releasegate::core::naming::{slugify, working_branch};
use releasegate::core::registry::{parse_service_list, ServiceRegistry};
use releasegate::core::types::BranchName;
use releasegate::engine::truncate;

const NAMES: &[&str] = &["payments", "ledger", "billing", "search", "gateway"];
const TAGS: &[&str] = &["core", "edge"];

/// Fixed catalog: every service has `prod`, tags alternate.
fn registry() -> ServiceRegistry {
    let services = NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| Service {
            name: name.to_string(),
            organization: "acme".to_string(),
            repository: "infra".to_string(),
            tags: vec![TAGS[i % TAGS.len()].to_string()],
            environments: vec![Environment {
                name: "prod".to_string(),
                template_path: format!("templates/{}/prod", name),
                generated_path: format!("generated/{}/prod", name),
                allowed_branches: vec![],
                deployment_branch: None,
                freeze_file_path: None,
            }],
        })
        .collect();
    ServiceRegistry::new(services)
}

/// A service name or tag, in random case.
fn token() -> impl Strategy<Value = String> {
    (
        prop::sample::select(NAMES.iter().chain(TAGS.iter()).copied().collect::<Vec<_>>()),
        any::<bool>(),
    )
        .prop_map(|(t, upper)| if upper { t.to_uppercase() } else { t.to_string() })
}

fn slug_source() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_ .-]{0,24}"
}

proptest! {
    #[test]
    fn lookup_dedups_in_first_seen_order(tokens in prop::collection::vec(token(), 1..8)) {
        let registry = registry();
        let found = registry.lookup_services(&tokens).unwrap();

        let names: Vec<&str> = found.iter().map(|s| s.name.as_str()).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        prop_assert_eq!(unique.len(), names.len());
        prop_assert!(!names.is_empty());

        // The first token's first service always comes first.
        let first = registry.lookup_services(&tokens[..1]).unwrap();
        prop_assert_eq!(&first[0].name, &found[0].name);
    }

    #[test]
    fn lookup_never_returns_empty_success(tokens in prop::collection::vec("[a-z]{1,6}", 0..4)) {
        match registry().lookup_services(&tokens) {
            Ok(found) => prop_assert!(!found.is_empty()),
            Err(_) => {}
        }
    }

    #[test]
    fn service_list_trimmed_and_unique(input in "[a-z ,]{0,40}") {
        let parsed = parse_service_list(&input);
        let unique: HashSet<&String> = parsed.iter().collect();
        prop_assert_eq!(unique.len(), parsed.len());
        for name in &parsed {
            prop_assert!(!name.is_empty());
            prop_assert_eq!(name.trim(), name.as_str());
            prop_assert!(!name.contains(','));
        }
        prop_assert_eq!(parse_service_list(&parsed.join(",")), parsed);
    }

    #[test]
    fn slugs_are_lowercase_dashed(text in ".{0,40}") {
        let slug = slugify(&text);
        prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        prop_assert!(!slug.starts_with('-'));
        prop_assert!(!slug.ends_with('-'));
        prop_assert!(!slug.contains("--"));
    }

    #[test]
    fn working_branches_are_valid(
        services in prop::collection::vec(slug_source(), 1..4),
        env in slug_source(),
    ) {
        let branch = working_branch("deploy", &services, &env).unwrap();
        prop_assert!(branch.as_str().starts_with("releasegate/deploy-"));
        prop_assert!(BranchName::new(branch.as_str()).is_ok());
    }

    #[test]
    fn truncation_respects_char_boundaries(text in ".{0,200}", limit in 0usize..120) {
        let cut = truncate(&text, limit);
        if text.len() <= limit {
            prop_assert_eq!(cut, text);
        } else {
            prop_assert!(cut.ends_with("..."));
            prop_assert!(cut.len() <= limit + 3);
            prop_assert!(text.starts_with(cut.trim_end_matches("...")));
        }
    }
}
