//! PostgreSQL-backed [`AuthStore`] implementation.
//!
//! Compound lifecycle operations run inside a transaction so concurrent
//! requests can never observe half-applied state (e.g. an activated account
//! whose verification token is still redeemable).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::db::Result;
use crate::models::{EmailVerificationToken, Otp, PasswordResetToken, Permission, Role, User, UserCreateRequest, UserStatus};
use crate::types::{BusinessId, RoleId, TokenId, UserId, abbrev_uuid};

use super::{AuthStore, ConsumeVerification};

/// PostgreSQL store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthStore for PgStore {
    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn create_user(&self, request: &UserCreateRequest) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, role_id, business_id, branch_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(UserId::new_v4())
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(request.role_id)
        .bind(request.business_id)
        .bind(request.branch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self, business_id: BusinessId) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE business_id = $1 ORDER BY created_at DESC")
            .bind(business_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn update_user_status(&self, user_id: UserId, status: UserStatus) -> Result<()> {
        sqlx::query("UPDATE users SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>("SELECT id, title FROM roles ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT id, title FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn get_role_by_title(&self, title: &str) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT id, title FROM roles WHERE title = $1")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>("SELECT code, title FROM permissions ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        Ok(permissions)
    }

    async fn permissions_for_role(&self, role_id: RoleId) -> Result<Vec<String>> {
        let codes = sqlx::query_scalar::<_, String>(
            "SELECT permission_code FROM role_permissions WHERE role_id = $1 ORDER BY permission_code",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    #[instrument(skip(self), fields(role = %abbrev_uuid(&role_id)))]
    async fn assign_permission(&self, role_id: RoleId, code: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_code)
            VALUES ($1, $2)
            ON CONFLICT (role_id, permission_code) DO NOTHING
            "#,
        )
        .bind(role_id)
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(role = %abbrev_uuid(&role_id)))]
    async fn unassign_permission(&self, role_id: RoleId, code: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_code = $2")
            .bind(role_id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, token), fields(email = %token.email))]
    async fn replace_email_verification(&self, token: &EmailVerificationToken) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM email_verification_tokens WHERE email = $1")
            .bind(&token.email)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO email_verification_tokens (token, email, expires_at) VALUES ($1, $2, $3)")
            .bind(&token.token)
            .bind(&token.email)
            .bind(token.expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn consume_email_verification(&self, token: &str, now: DateTime<Utc>) -> Result<ConsumeVerification> {
        let mut tx = self.pool.begin().await?;

        let found = sqlx::query_as::<_, EmailVerificationToken>(
            "SELECT token, email, expires_at FROM email_verification_tokens WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(found) = found else {
            return Ok(ConsumeVerification::NotFound);
        };

        if found.expires_at <= now {
            // Dead token: remove it so the table doesn't accumulate garbage
            sqlx::query("DELETE FROM email_verification_tokens WHERE token = $1")
                .bind(token)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(ConsumeVerification::Expired);
        }

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET status = 'active', updated_at = now() WHERE email = $1 AND status = 'pending' RETURNING *",
        )
        .bind(&found.email)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            // Token without a pending account behind it is useless; drop it
            sqlx::query("DELETE FROM email_verification_tokens WHERE token = $1")
                .bind(token)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(ConsumeVerification::NotFound);
        };

        sqlx::query("DELETE FROM email_verification_tokens WHERE token = $1")
            .bind(token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ConsumeVerification::Consumed(user))
    }

    #[instrument(skip(self, otp), fields(user = %abbrev_uuid(&otp.user_id)))]
    async fn replace_otp(&self, otp: &Otp) -> Result<()> {
        // user_id is the primary key of otps, so a single upsert both replaces
        // the previous code and keeps at most one live code per user.
        sqlx::query(
            r#"
            INSERT INTO otps (user_id, code, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(otp.user_id)
        .bind(&otp.code)
        .bind(otp.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_otp(&self, user_id: UserId) -> Result<Option<Otp>> {
        let otp = sqlx::query_as::<_, Otp>("SELECT user_id, code, expires_at FROM otps WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(otp)
    }

    #[instrument(skip(self, code), fields(user = %abbrev_uuid(&user_id)))]
    async fn delete_otp(&self, user_id: UserId, code: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM otps WHERE user_id = $1 AND code = $2")
            .bind(user_id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, token), fields(user = %abbrev_uuid(&token.user_id)))]
    async fn create_password_reset(&self, token: &PasswordResetToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at, used_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.created_at)
        .bind(token.used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_password_reset(&self, id: TokenId) -> Result<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>("SELECT * FROM password_reset_tokens WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }

    #[instrument(skip(self, password_hash), fields(user = %abbrev_uuid(&user_id)))]
    async fn complete_password_reset(&self, id: TokenId, user_id: UserId, password_hash: &str, used_at: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Claim the token first: a concurrent confirmation that already
        // marked it used wins, and this one backs out untouched.
        let claimed = sqlx::query("UPDATE password_reset_tokens SET used_at = $1 WHERE id = $2 AND used_at IS NULL")
            .bind(used_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if claimed.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        // Every other outstanding token for the user is retired too, so a
        // second reset email issued earlier cannot change the password again.
        sqlx::query("UPDATE password_reset_tokens SET used_at = $1 WHERE user_id = $2 AND used_at IS NULL")
            .bind(used_at)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        // Drop any live OTP: it was bound to the old credential
        sqlx::query("DELETE FROM otps WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
