//! Action authorization guard.
//!
//! Handlers call [`require`] before mutating anything, even when the route
//! table already gated navigation. Route checks protect pages; this guard
//! protects the operations behind them.

use crate::api::models::users::CurrentUser;
use crate::errors::{Error, Result};
use crate::types::abbrev_uuid;

/// Require every listed permission on the current user. Fails closed: an
/// empty permission list passes, anything missing is a 403.
pub fn require(user: &CurrentUser, required: &[&str]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|p| !user.has_permission(p))
        .map(|p| p.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::info!(
            user = %abbrev_uuid(&user.id),
            role = %user.role_title,
            ?missing,
            "action denied"
        );
        Err(Error::Forbidden { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user_with(permissions: &[&str]) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            username: "testuser".to_string(),
            role_id: Uuid::new_v4(),
            role_title: "branch-manager".to_string(),
            business_id: Uuid::new_v4(),
            branch_id: Some(Uuid::new_v4()),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_all_permissions_present() {
        let user = user_with(&["role:view", "role:update"]);
        assert!(require(&user, &["role:view", "role:update"]).is_ok());
    }

    #[test]
    fn test_missing_permission_is_forbidden() {
        let user = user_with(&["role:view"]);
        let err = require(&user, &["role:view", "role:update"]).unwrap_err();
        match err {
            Error::Forbidden { missing } => assert_eq!(missing, vec!["role:update".to_string()]),
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_requirement_passes() {
        let user = user_with(&[]);
        assert!(require(&user, &[]).is_ok());
    }

    #[test]
    fn test_extra_permissions_ignored() {
        let user = user_with(&["order:view", "order:create", "stock:view"]);
        assert!(require(&user, &["order:create"]).is_ok());
    }
}
