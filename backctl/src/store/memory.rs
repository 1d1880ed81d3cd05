//! In-memory [`AuthStore`] implementation.
//!
//! Stores everything in maps behind a single lock. Suitable for tests and
//! single-process experiments; data is lost on restart. Holding one lock
//! across each compound operation gives the same atomicity the Postgres
//! implementation gets from transactions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::db::{DbError, Result};
use crate::models::{EmailVerificationToken, Otp, PasswordResetToken, Permission, Role, User, UserCreateRequest, UserStatus};
use crate::types::{BusinessId, RoleId, TokenId, UserId};

use super::{AuthStore, ConsumeVerification};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    roles: HashMap<RoleId, Role>,
    permissions: Vec<Permission>,
    role_permissions: HashMap<RoleId, Vec<String>>,
    email_tokens: HashMap<String, EmailVerificationToken>,
    otps: HashMap<UserId, Otp>,
    reset_tokens: HashMap<TokenId, PasswordResetToken>,
}

/// In-memory implementation of the [`AuthStore`] trait.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a role with permissions, returning its id.
    pub fn seed_role(&self, title: &str, permissions: &[&str]) -> RoleId {
        let mut inner = self.inner.write();
        let id = Uuid::new_v4();
        inner.roles.insert(
            id,
            Role {
                id,
                title: title.to_string(),
            },
        );
        for code in permissions {
            if !inner.permissions.iter().any(|p| p.code == *code) {
                inner.permissions.push(Permission {
                    code: code.to_string(),
                    title: code.to_string(),
                });
            }
        }
        inner
            .role_permissions
            .insert(id, permissions.iter().map(|p| p.to_string()).collect());
        id
    }

    /// Seed a catalog permission without attaching it to a role.
    pub fn seed_permission(&self, code: &str, title: &str) {
        let mut inner = self.inner.write();
        if !inner.permissions.iter().any(|p| p.code == code) {
            inner.permissions.push(Permission {
                code: code.to_string(),
                title: title.to_string(),
            });
        }
    }

    /// Flip a user's status directly (test setup helper).
    pub fn set_user_status(&self, user_id: UserId, status: UserStatus) {
        let mut inner = self.inner.write();
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.status = status;
        }
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn create_user(&self, request: &UserCreateRequest) -> Result<User> {
        let mut inner = self.inner.write();

        if inner.users.values().any(|u| u.email == request.email) {
            return Err(DbError::UniqueViolation {
                constraint: Some("users_email_key".to_string()),
                table: Some("users".to_string()),
                message: "duplicate email".to_string(),
            });
        }
        if inner.users.values().any(|u| u.username == request.username) {
            return Err(DbError::UniqueViolation {
                constraint: Some("users_username_key".to_string()),
                table: Some("users".to_string()),
                message: "duplicate username".to_string(),
            });
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: request.username.clone(),
            email: request.email.clone(),
            password_hash: request.password_hash.clone(),
            role_id: request.role_id,
            business_id: request.business_id,
            branch_id: request.branch_id,
            status: UserStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.inner.read().users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.inner.read().users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, business_id: BusinessId) -> Result<Vec<User>> {
        let inner = self.inner.read();
        let mut users: Vec<User> = inner.users.values().filter(|u| u.business_id == business_id).cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn update_user_status(&self, user_id: UserId, status: UserStatus) -> Result<()> {
        self.set_user_status(user_id, status);
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut roles: Vec<Role> = self.inner.read().roles.values().cloned().collect();
        roles.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(roles)
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>> {
        Ok(self.inner.read().roles.get(&id).cloned())
    }

    async fn get_role_by_title(&self, title: &str) -> Result<Option<Role>> {
        Ok(self.inner.read().roles.values().find(|r| r.title == title).cloned())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let mut permissions = self.inner.read().permissions.clone();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(permissions)
    }

    async fn permissions_for_role(&self, role_id: RoleId) -> Result<Vec<String>> {
        let mut codes = self.inner.read().role_permissions.get(&role_id).cloned().unwrap_or_default();
        codes.sort();
        Ok(codes)
    }

    async fn assign_permission(&self, role_id: RoleId, code: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.roles.contains_key(&role_id) {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("role_permissions_role_id_fkey".to_string()),
                table: Some("role_permissions".to_string()),
                message: "unknown role".to_string(),
            });
        }
        if !inner.permissions.iter().any(|p| p.code == code) {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("role_permissions_permission_code_fkey".to_string()),
                table: Some("role_permissions".to_string()),
                message: "unknown permission".to_string(),
            });
        }
        let codes = inner.role_permissions.entry(role_id).or_default();
        if !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
        Ok(())
    }

    async fn unassign_permission(&self, role_id: RoleId, code: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        let Some(codes) = inner.role_permissions.get_mut(&role_id) else {
            return Ok(false);
        };
        let before = codes.len();
        codes.retain(|c| c != code);
        Ok(codes.len() != before)
    }

    async fn replace_email_verification(&self, token: &EmailVerificationToken) -> Result<()> {
        let mut inner = self.inner.write();
        inner.email_tokens.retain(|_, t| t.email != token.email);
        inner.email_tokens.insert(token.token.clone(), token.clone());
        Ok(())
    }

    async fn consume_email_verification(&self, token: &str, now: DateTime<Utc>) -> Result<ConsumeVerification> {
        let mut inner = self.inner.write();

        let Some(found) = inner.email_tokens.get(token).cloned() else {
            return Ok(ConsumeVerification::NotFound);
        };

        if found.expires_at <= now {
            inner.email_tokens.remove(token);
            return Ok(ConsumeVerification::Expired);
        }

        let user = inner
            .users
            .values_mut()
            .find(|u| u.email == found.email && u.status == UserStatus::Pending);
        let Some(user) = user else {
            inner.email_tokens.remove(token);
            return Ok(ConsumeVerification::NotFound);
        };

        user.status = UserStatus::Active;
        user.updated_at = now;
        let activated = user.clone();
        inner.email_tokens.remove(token);
        Ok(ConsumeVerification::Consumed(activated))
    }

    async fn replace_otp(&self, otp: &Otp) -> Result<()> {
        self.inner.write().otps.insert(otp.user_id, otp.clone());
        Ok(())
    }

    async fn get_otp(&self, user_id: UserId) -> Result<Option<Otp>> {
        Ok(self.inner.read().otps.get(&user_id).cloned())
    }

    async fn delete_otp(&self, user_id: UserId, code: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        match inner.otps.get(&user_id) {
            Some(otp) if otp.code == code => {
                inner.otps.remove(&user_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_password_reset(&self, token: &PasswordResetToken) -> Result<()> {
        self.inner.write().reset_tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn get_password_reset(&self, id: TokenId) -> Result<Option<PasswordResetToken>> {
        Ok(self.inner.read().reset_tokens.get(&id).cloned())
    }

    async fn complete_password_reset(&self, id: TokenId, user_id: UserId, password_hash: &str, used_at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write();

        // Claim the token first; a confirmation that lost the race to an
        // earlier redemption leaves everything untouched.
        match inner.reset_tokens.get_mut(&id) {
            Some(token) if token.used_at.is_none() => token.used_at = Some(used_at),
            _ => return Ok(false),
        }

        if let Some(user) = inner.users.get_mut(&user_id) {
            user.password_hash = Some(password_hash.to_string());
            user.updated_at = used_at;
        }

        for token in inner.reset_tokens.values_mut() {
            if token.user_id == user_id && token.used_at.is_none() {
                token.used_at = Some(used_at);
            }
        }

        inner.otps.remove(&user_id);
        Ok(true)
    }
}
