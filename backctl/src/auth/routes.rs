//! Route permission table and path matcher.
//!
//! Navigable paths are described by patterns with bracketed dynamic segments,
//! e.g. `/businesses/{business_id}/dashboard`. A pattern is compiled once into
//! an anchored regex where each `{name}` segment matches exactly one non-empty
//! path segment. Every permission listed on a rule is required (AND semantics).
//!
//! When several rules match a path, the rule with the longest literal prefix
//! wins, with total literal length and then declaration order as tie-breaks.
//! Paths matching no rule are public unless `deny_unmatched` is set.

use regex::Regex;

use crate::api::models::users::CurrentUser;
use crate::config::{RouteRule, RoutesConfig};
use crate::errors::Error;

/// Built-in route rules. Config `extra_rules` are appended after these, so a
/// config rule with a longer literal prefix can take precedence over them.
const DEFAULT_RULES: &[(&str, &[&str])] = &[
    ("/roles", &["role:view"]),
    ("/roles/{role_id}/permissions/{code}", &["role:update"]),
    ("/permissions", &["role:view"]),
    ("/users", &["user:view"]),
    ("/branches", &["branch:view"]),
    ("/businesses/{business_id}/dashboard", &["dashboard:view"]),
    (
        "/businesses/{business_id}/branches/{branch_id}/dashboard",
        &["dashboard:view", "branch:view"],
    ),
    ("/products", &["product:view"]),
    ("/orders", &["order:view"]),
    ("/stock", &["stock:view"]),
    ("/suppliers", &["supplier:view"]),
];

/// A single compiled route rule.
#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: String,
    regex: Regex,
    permissions: Vec<String>,
    /// Number of characters before the first dynamic segment
    literal_prefix_len: usize,
    /// Total literal characters across the whole pattern
    literal_len: usize,
}

/// Immutable, precompiled route permission table. Built once at startup and
/// shared through application state.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<CompiledRule>,
    deny_unmatched: bool,
}

/// Outcome of a navigation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavDecision {
    /// Path is public or the user holds every required permission
    Allow,
    /// A rule matched but the request carries no authenticated session
    RequiresLogin,
    /// The user is missing one or more of the required permissions.
    /// `missing` is empty when the path itself is denied (`deny_unmatched`).
    Denied { missing: Vec<String> },
}

impl RouteTable {
    /// Build the table from configuration: built-in rules plus config extras.
    pub fn from_config(config: &RoutesConfig) -> Result<Self, Error> {
        let mut rules: Vec<RouteRule> = DEFAULT_RULES
            .iter()
            .map(|(pattern, permissions)| RouteRule {
                pattern: pattern.to_string(),
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
            })
            .collect();
        rules.extend(config.extra_rules.iter().cloned());
        Self::compile(&rules, config.deny_unmatched)
    }

    /// Compile an explicit rule list. Primarily used by tests; production code
    /// goes through [`RouteTable::from_config`].
    pub fn compile(rules: &[RouteRule], deny_unmatched: bool) -> Result<Self, Error> {
        let compiled = rules
            .iter()
            .map(|rule| CompiledRule::compile(rule))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rules: compiled,
            deny_unmatched,
        })
    }

    /// Find the winning rule for a path and return its required permissions.
    /// `None` means no rule matched.
    pub fn required_permissions(&self, path: &str) -> Option<&[String]> {
        let path = normalize(path);

        self.rules
            .iter()
            .filter(|rule| rule.regex.is_match(path))
            // Longest literal prefix wins; max_by_key takes the last maximum,
            // so reverse declaration order to make earlier rules win ties.
            .rev()
            .max_by_key(|rule| (rule.literal_prefix_len, rule.literal_len))
            .map(|rule| {
                tracing::trace!(pattern = %rule.pattern, path, "route rule matched");
                rule.permissions.as_slice()
            })
    }

    /// Decide whether a (possibly anonymous) user may navigate to `path`.
    pub fn decide(&self, path: &str, user: Option<&CurrentUser>) -> NavDecision {
        match self.required_permissions(path) {
            None => {
                if self.deny_unmatched {
                    NavDecision::Denied { missing: vec![] }
                } else {
                    tracing::debug!(path, "no route rule matched; allowing");
                    NavDecision::Allow
                }
            }
            Some(required) => {
                let Some(user) = user else {
                    return NavDecision::RequiresLogin;
                };
                let missing: Vec<String> = required.iter().filter(|p| !user.has_permission(p)).cloned().collect();
                if missing.is_empty() {
                    NavDecision::Allow
                } else {
                    NavDecision::Denied { missing }
                }
            }
        }
    }
}

impl CompiledRule {
    fn compile(rule: &RouteRule) -> Result<Self, Error> {
        if !rule.pattern.starts_with('/') {
            return Err(Error::Internal {
                operation: format!("compile route pattern '{}': must start with '/'", rule.pattern),
            });
        }

        let mut regex_src = String::from("^");
        let mut literal_len = 0;
        let mut literal_prefix_len = 0;
        let mut seen_dynamic = false;

        let trimmed = rule.pattern.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };

        for segment in trimmed.split('/').skip(1) {
            regex_src.push('/');
            if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                // Dynamic segment: exactly one non-empty path segment
                regex_src.push_str("[^/]+");
                seen_dynamic = true;
            } else if segment.contains('{') || segment.contains('}') {
                return Err(Error::Internal {
                    operation: format!(
                        "compile route pattern '{}': segment '{}' mixes literal and bracket syntax",
                        rule.pattern, segment
                    ),
                });
            } else {
                regex_src.push_str(&regex::escape(segment));
                literal_len += segment.len() + 1;
                if !seen_dynamic {
                    literal_prefix_len += segment.len() + 1;
                }
            }
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src).map_err(|e| Error::Internal {
            operation: format!("compile route pattern '{}': {e}", rule.pattern),
        })?;

        Ok(Self {
            pattern: rule.pattern.clone(),
            regex,
            permissions: rule.permissions.clone(),
            literal_prefix_len,
            literal_len,
        })
    }
}

impl std::fmt::Display for NavDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavDecision::Allow => write!(f, "allow"),
            NavDecision::RequiresLogin => write!(f, "requires login"),
            NavDecision::Denied { missing } => write!(f, "denied (missing: {missing:?})"),
        }
    }
}

/// Strip a trailing slash so `/roles/` and `/roles` hit the same rule.
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn rule(pattern: &str, permissions: &[&str]) -> RouteRule {
        RouteRule {
            pattern: pattern.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn user_with(permissions: &[&str]) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            username: "testuser".to_string(),
            role_id: Uuid::new_v4(),
            role_title: "cashier".to_string(),
            business_id: Uuid::new_v4(),
            branch_id: None,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_literal_match() {
        let table = RouteTable::compile(&[rule("/roles", &["role:view"])], false).unwrap();
        assert_eq!(table.required_permissions("/roles").unwrap(), &["role:view".to_string()]);
        assert_eq!(table.required_permissions("/roles/"), table.required_permissions("/roles"));
        assert!(table.required_permissions("/roles/abc").is_none());
        assert!(table.required_permissions("/rolesx").is_none());
    }

    #[test]
    fn test_dynamic_segment_matches_one_segment() {
        let table = RouteTable::compile(&[rule("/businesses/{business_id}/dashboard", &["dashboard:view"])], false).unwrap();
        assert!(table.required_permissions("/businesses/42/dashboard").is_some());
        assert!(table.required_permissions("/businesses/dashboard").is_none());
        assert!(table.required_permissions("/businesses/42/extra/dashboard").is_none());
        // Dynamic segments must be non-empty
        assert!(table.required_permissions("/businesses//dashboard").is_none());
    }

    #[test]
    fn test_and_semantics() {
        let table = RouteTable::compile(
            &[rule(
                "/businesses/{business_id}/branches/{branch_id}/dashboard",
                &["dashboard:view", "branch:view"],
            )],
            false,
        )
        .unwrap();

        let path = "/businesses/1/branches/2/dashboard";
        // Holding every listed permission allows navigation
        let full = user_with(&["dashboard:view", "branch:view"]);
        assert_eq!(table.decide(path, Some(&full)), NavDecision::Allow);

        // Holding only one of two is denied, reporting the missing code
        let partial = user_with(&["dashboard:view"]);
        assert_eq!(
            table.decide(path, Some(&partial)),
            NavDecision::Denied {
                missing: vec!["branch:view".to_string()]
            }
        );
    }

    #[test]
    fn test_extra_permissions_do_not_hurt() {
        let table = RouteTable::compile(&[rule("/roles", &["role:view"])], false).unwrap();
        let user = user_with(&["role:view", "order:view", "stock:update"]);
        assert_eq!(table.decide("/roles", Some(&user)), NavDecision::Allow);
    }

    #[test]
    fn test_unmatched_path_is_public_by_default() {
        let table = RouteTable::compile(&[rule("/roles", &["role:view"])], false).unwrap();
        assert_eq!(table.decide("/totally/unknown", None), NavDecision::Allow);
    }

    #[test]
    fn test_deny_unmatched() {
        let table = RouteTable::compile(&[rule("/roles", &["role:view"])], true).unwrap();
        assert_eq!(table.decide("/totally/unknown", None), NavDecision::Denied { missing: vec![] });
        // Matched paths still behave normally
        let user = user_with(&["role:view"]);
        assert_eq!(table.decide("/roles", Some(&user)), NavDecision::Allow);
    }

    #[test]
    fn test_anonymous_user_requires_login() {
        let table = RouteTable::compile(&[rule("/roles", &["role:view"])], false).unwrap();
        assert_eq!(table.decide("/roles", None), NavDecision::RequiresLogin);
    }

    #[test]
    fn test_longest_literal_prefix_wins() {
        // Both patterns match /orders/today; the fully literal one must win.
        let table = RouteTable::compile(
            &[
                rule("/orders/{order_id}", &["order:view"]),
                rule("/orders/today", &["dashboard:view"]),
            ],
            false,
        )
        .unwrap();

        assert_eq!(
            table.required_permissions("/orders/today").unwrap(),
            &["dashboard:view".to_string()]
        );
        assert_eq!(table.required_permissions("/orders/1234").unwrap(), &["order:view".to_string()]);
    }

    #[test]
    fn test_declaration_order_breaks_exact_ties() {
        let table = RouteTable::compile(
            &[rule("/things/{a}", &["first:perm"]), rule("/things/{b}", &["second:perm"])],
            false,
        )
        .unwrap();
        assert_eq!(table.required_permissions("/things/x").unwrap(), &["first:perm".to_string()]);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(RouteTable::compile(&[rule("roles", &["role:view"])], false).is_err());
        assert!(RouteTable::compile(&[rule("/roles/{id", &["role:view"])], false).is_err());
    }

    #[test]
    fn test_default_table_roles_scenario() {
        let table = RouteTable::from_config(&RoutesConfig::default()).unwrap();

        let viewer = user_with(&["role:view"]);
        assert_eq!(table.decide("/roles", Some(&viewer)), NavDecision::Allow);

        let cashier = user_with(&["order:view", "order:create", "dashboard:view", "product:view"]);
        assert_eq!(
            table.decide("/roles", Some(&cashier)),
            NavDecision::Denied {
                missing: vec!["role:view".to_string()]
            }
        );
        assert_eq!(table.decide("/orders", Some(&cashier)), NavDecision::Allow);
    }
}
