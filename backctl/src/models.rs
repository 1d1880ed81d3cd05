//! Database entity models for the access-control engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::{BranchId, BusinessId, RoleId, TokenId, UserId};

/// Account lifecycle status. New accounts start `Pending` until their email
/// address is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
}

/// Database entity model for a user account
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role_id: RoleId,
    pub business_id: BusinessId,
    pub branch_id: Option<BranchId>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateRequest {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role_id: RoleId,
    pub business_id: BusinessId,
    pub branch_id: Option<BranchId>,
}

/// A named role that users are assigned to
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Role {
    #[schema(value_type = String, format = "uuid")]
    pub id: RoleId,
    pub title: String,
}

/// An entry in the permission catalog. Codes follow the `resource:action`
/// convention, e.g. `order:create`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub code: String,
    pub title: String,
}

/// Database entity model for an email verification token
#[derive(Debug, Clone, FromRow)]
pub struct EmailVerificationToken {
    pub token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Database entity model for a one-time passcode. The `user_id` is the primary
/// key, so at most one code can be live per user at any time.
#[derive(Debug, Clone, FromRow)]
pub struct Otp {
    pub user_id: UserId,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Database entity model for a password reset token. Only the Argon2 hash of
/// the raw token is stored; the raw value travels in the reset email.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: TokenId,
    pub user_id: UserId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl PasswordResetToken {
    /// A token is usable only while unexpired and unused.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && self.expires_at > now
    }
}
