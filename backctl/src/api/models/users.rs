//! API models for users and the authenticated principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{User, UserStatus};
use crate::types::{BranchId, BusinessId, RoleId, UserId};

/// The authenticated principal carried through request handling. Built from
/// verified session claims, so handlers can authorize without a database trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub username: String,
    #[schema(value_type = String, format = "uuid")]
    pub role_id: RoleId,
    pub role_title: String,
    #[schema(value_type = String, format = "uuid")]
    pub business_id: BusinessId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub branch_id: Option<BranchId>,
    /// Flattened permission codes granted through the user's role
    pub permissions: Vec<String>,
}

impl CurrentUser {
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.iter().any(|p| p == code)
    }
}

/// Registration request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[schema(value_type = String, format = "uuid")]
    pub business_id: BusinessId,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub branch_id: Option<BranchId>,
}

/// User representation returned by the API. Never includes the password hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[schema(value_type = String, format = "uuid")]
    pub role_id: RoleId,
    #[schema(value_type = String, format = "uuid")]
    pub business_id: BusinessId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub branch_id: Option<BranchId>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role_id: user.role_id,
            business_id: user.business_id,
            branch_id: user.branch_id,
            status: user.status,
            created_at: user.created_at,
        }
    }
}
