//! Persistence layer for accounts, the permission catalog, and verification
//! credentials.
//!
//! The [`AuthStore`] trait abstracts storage so the engine can run against
//! PostgreSQL in production and an in-memory map in tests. Compound operations
//! (`replace_*`, `consume_*`, `complete_password_reset`) are single trait
//! methods because their atomicity is an implementation obligation: Postgres
//! uses transactions, the in-memory store holds one lock across the steps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Result;
use crate::models::{EmailVerificationToken, Otp, PasswordResetToken, Permission, Role, User, UserCreateRequest, UserStatus};
use crate::types::{BusinessId, RoleId, TokenId, UserId};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of attempting to consume an email verification token.
#[derive(Debug, Clone)]
pub enum ConsumeVerification {
    /// Token was live: the account is now active and the token is gone
    Consumed(User),
    /// No such token (never issued, already consumed, or no matching account)
    NotFound,
    /// Token existed but its deadline had passed; it has been removed
    Expired,
}

/// Storage operations for the access-control engine.
///
/// Lifecycle invariants the implementations must uphold:
/// - at most one live email verification token per address
/// - at most one live OTP per user
/// - consuming any credential removes it, so replay attempts find nothing
#[async_trait]
pub trait AuthStore: Send + Sync {
    // --- users ---

    /// Create a user account in `Pending` status.
    async fn create_user(&self, request: &UserCreateRequest) -> Result<User>;

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// List accounts within one business, newest first.
    async fn list_users(&self, business_id: BusinessId) -> Result<Vec<User>>;

    /// Set an account's status directly, bypassing the verification lifecycle.
    /// Used by startup bootstrap for the initial owner account.
    async fn update_user_status(&self, user_id: UserId, status: UserStatus) -> Result<()>;

    // --- roles and permissions ---

    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>>;

    async fn get_role_by_title(&self, title: &str) -> Result<Option<Role>>;

    async fn list_permissions(&self) -> Result<Vec<Permission>>;

    /// Flattened permission codes granted to a role, sorted ascending.
    async fn permissions_for_role(&self, role_id: RoleId) -> Result<Vec<String>>;

    /// Grant a catalog permission to a role. Granting an already-held
    /// permission is a no-op.
    async fn assign_permission(&self, role_id: RoleId, code: &str) -> Result<()>;

    /// Revoke a permission from a role. Returns whether an assignment existed.
    async fn unassign_permission(&self, role_id: RoleId, code: &str) -> Result<bool>;

    // --- email verification tokens ---

    /// Store a verification token, replacing any previous token for the same
    /// address in the same atomic step.
    async fn replace_email_verification(&self, token: &EmailVerificationToken) -> Result<()>;

    /// Atomically consume a verification token: look it up, check expiry,
    /// activate the matching account, and delete the token.
    async fn consume_email_verification(&self, token: &str, now: DateTime<Utc>) -> Result<ConsumeVerification>;

    // --- one-time passcodes ---

    /// Store an OTP, atomically replacing any previous code for the user.
    async fn replace_otp(&self, otp: &Otp) -> Result<()>;

    async fn get_otp(&self, user_id: UserId) -> Result<Option<Otp>>;

    /// Delete the user's OTP only if it matches `code`. Returns whether a row
    /// was removed; a concurrent redemption of the same code loses here.
    async fn delete_otp(&self, user_id: UserId, code: &str) -> Result<bool>;

    // --- password reset tokens ---

    async fn create_password_reset(&self, token: &PasswordResetToken) -> Result<()>;

    async fn get_password_reset(&self, id: TokenId) -> Result<Option<PasswordResetToken>>;

    /// Atomically finish a reset: set the new password hash, mark the token
    /// used, and mark every other outstanding token for the user used.
    /// Redeem the reset token and rotate the password in one atomic step.
    /// Returns `false` without changing anything when the token has already
    /// been redeemed, so two racing confirmations cannot both succeed.
    async fn complete_password_reset(&self, id: TokenId, user_id: UserId, password_hash: &str, used_at: DateTime<Utc>) -> Result<bool>;
}
