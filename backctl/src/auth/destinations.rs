//! Role to landing-path resolution.
//!
//! After login the client is sent to a role-appropriate page. Resolution is a
//! pure function of the session claims, so the same claims always produce the
//! same destination.

use crate::api::models::users::CurrentUser;

/// Fallback destination for roles without a dedicated landing page.
pub const DEFAULT_DESTINATION: &str = "/dashboard";

/// Resolve the landing path for an authenticated user.
pub fn destination_for(user: &CurrentUser) -> String {
    match user.role_title.as_str() {
        "owner" => format!("/businesses/{}/dashboard", user.business_id),
        "branch-manager" => match user.branch_id {
            Some(branch_id) => format!("/businesses/{}/branches/{}/dashboard", user.business_id, branch_id),
            // Managers not pinned to a branch land on the business dashboard
            None => format!("/businesses/{}/dashboard", user.business_id),
        },
        "cashier" => "/orders".to_string(),
        _ => DEFAULT_DESTINATION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(role_title: &str, branch_id: Option<Uuid>) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            username: "testuser".to_string(),
            role_id: Uuid::new_v4(),
            role_title: role_title.to_string(),
            business_id: Uuid::new_v4(),
            branch_id,
            permissions: vec![],
        }
    }

    #[test]
    fn test_owner_lands_on_business_dashboard() {
        let u = user("owner", None);
        assert_eq!(destination_for(&u), format!("/businesses/{}/dashboard", u.business_id));
    }

    #[test]
    fn test_branch_manager_lands_on_branch_dashboard() {
        let branch = Uuid::new_v4();
        let u = user("branch-manager", Some(branch));
        assert_eq!(
            destination_for(&u),
            format!("/businesses/{}/branches/{}/dashboard", u.business_id, branch)
        );
    }

    #[test]
    fn test_branch_manager_without_branch_falls_back() {
        let u = user("branch-manager", None);
        assert_eq!(destination_for(&u), format!("/businesses/{}/dashboard", u.business_id));
    }

    #[test]
    fn test_cashier_lands_on_orders() {
        assert_eq!(destination_for(&user("cashier", None)), "/orders");
    }

    #[test]
    fn test_unknown_role_gets_default() {
        assert_eq!(destination_for(&user("intern", None)), DEFAULT_DESTINATION);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let u = user("owner", None);
        assert_eq!(destination_for(&u), destination_for(&u));
    }
}
