//! core::naming
//!
//! Working-branch naming.
//!
//! Every operation gets a deterministic working branch derived from what it
//! touches, so a retry of the same request lands on (and resets) the same
//! branch instead of leaving a trail of abandoned ones.

use super::types::{BranchName, TypeError};

/// Namespace prefix for every branch the engine creates.
pub const BRANCH_PREFIX: &str = "releasegate";

/// Generate a branch-safe slug from free text.
///
/// - Lowercase
/// - Spaces, underscores, dots and commas become hyphens
/// - Other invalid characters are dropped
/// - Truncated to a reasonable length
///
/// # Example
///
/// ```
/// use releasegate::core::naming::slugify;
///
/// assert_eq!(slugify("Payments API"), "payments-api");
/// assert_eq!(slugify("web_frontend"), "web-frontend");
/// ```
pub fn slugify(text: &str) -> String {
    text.chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if matches!(c, ' ' | '_' | '-' | '.' | ',') {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(80)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// Working branch for an operation: `releasegate/{action}-{services}-{environment}`.
///
/// # Example
///
/// ```
/// use releasegate::core::naming::working_branch;
///
/// let names = vec!["payments".to_string(), "ledger".to_string()];
/// let branch = working_branch("deploy", &names, "prod").unwrap();
/// assert_eq!(branch.as_str(), "releasegate/deploy-payments-ledger-prod");
/// ```
pub fn working_branch(
    action: &str,
    services: &[String],
    environment: &str,
) -> Result<BranchName, TypeError> {
    let joined = services.join("-");
    BranchName::new(format!(
        "{}/{}-{}-{}",
        BRANCH_PREFIX,
        slugify(action),
        slugify(&joined),
        slugify(environment)
    ))
}
