//! Verification credential lifecycle: email verification tokens, one-time
//! passcodes, and password reset tokens.
//!
//! Every credential moves ISSUED -> CONSUMED or ISSUED -> EXPIRED, never back.
//! Rejections surface as [`Error::InvalidCredential`], which renders as one
//! generic message per credential family regardless of the precise fault.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::password;
use crate::errors::{CredentialFault, CredentialKind, Error, Result};
use crate::models::{EmailVerificationToken, Otp, PasswordResetToken, User};
use crate::store::{AuthStore, ConsumeVerification};
use crate::types::{TokenId, UserId, abbrev_uuid};

fn deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(600))
}

/// Issue an email verification token for an address, replacing any earlier
/// token for the same address.
#[instrument(skip(store, email))]
pub async fn issue_email_verification(store: &dyn AuthStore, ttl: Duration, email: &str) -> Result<EmailVerificationToken> {
    let token = EmailVerificationToken {
        token: password::generate_token(),
        email: email.to_string(),
        expires_at: deadline(Utc::now(), ttl),
    };
    store.replace_email_verification(&token).await?;
    Ok(token)
}

/// Redeem an email verification token, activating the pending account.
///
/// Single-use: the winning request removes the token, so a replay of the same
/// link is indistinguishable from a token that never existed.
#[instrument(skip(store, token))]
pub async fn confirm_email(store: &dyn AuthStore, token: &str) -> Result<User> {
    match store.consume_email_verification(token, Utc::now()).await? {
        ConsumeVerification::Consumed(user) => {
            info!(user = %abbrev_uuid(&user.id), "email verified, account activated");
            Ok(user)
        }
        ConsumeVerification::NotFound => Err(Error::InvalidCredential {
            kind: CredentialKind::EmailVerification,
            fault: CredentialFault::NotFound,
        }),
        ConsumeVerification::Expired => Err(Error::InvalidCredential {
            kind: CredentialKind::EmailVerification,
            fault: CredentialFault::Expired,
        }),
    }
}

/// Issue a six-digit one-time passcode for a user. Any previous live code for
/// the user is replaced in the same step, so at most one code works at a time.
#[instrument(skip(store), fields(user = %abbrev_uuid(&user_id)))]
pub async fn issue_otp(store: &dyn AuthStore, ttl: Duration, user_id: UserId) -> Result<Otp> {
    let otp = Otp {
        user_id,
        code: password::generate_otp_code(),
        expires_at: deadline(Utc::now(), ttl),
    };
    store.replace_otp(&otp).await?;
    Ok(otp)
}

/// Redeem a one-time passcode.
///
/// Expiry is checked against the stored deadline before the code is accepted,
/// and the comparison is constant-time. On success the code is deleted with a
/// compare-and-delete, so a concurrent redemption of the same code loses.
#[instrument(skip(store, code), fields(user = %abbrev_uuid(&user_id)))]
pub async fn verify_otp(store: &dyn AuthStore, user_id: UserId, code: &str) -> Result<()> {
    let rejection = |fault| Error::InvalidCredential {
        kind: CredentialKind::Otp,
        fault,
    };

    let Some(otp) = store.get_otp(user_id).await? else {
        return Err(rejection(CredentialFault::NotFound));
    };

    if otp.expires_at <= Utc::now() {
        // Dead code: remove it so the stale row can't linger
        store.delete_otp(user_id, &otp.code).await?;
        return Err(rejection(CredentialFault::Expired));
    }

    if !constant_time_eq(code.as_bytes(), otp.code.as_bytes()) {
        return Err(rejection(CredentialFault::NotFound));
    }

    // Compare-and-delete: only the request that removes the row wins
    if !store.delete_otp(user_id, &otp.code).await? {
        return Err(rejection(CredentialFault::NotFound));
    }

    info!(user = %abbrev_uuid(&user_id), "one-time passcode consumed");
    Ok(())
}

/// Start a password reset for a user. Returns the stored token and the raw
/// secret to embed in the reset link; only the Argon2 hash is persisted.
#[instrument(skip(store, user), fields(user_id = %abbrev_uuid(&user.id)))]
pub async fn start_password_reset(store: &dyn AuthStore, ttl: Duration, user: &User) -> Result<(PasswordResetToken, String)> {
    let raw_token = password::generate_token();
    let now = Utc::now();

    // Argon2 is CPU-bound, keep it off the async runtime
    let raw_for_hash = raw_token.clone();
    let token_hash = tokio::task::spawn_blocking(move || password::hash_string(&raw_for_hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("hash reset token: {e}"),
        })??;

    let token = PasswordResetToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        token_hash,
        expires_at: deadline(now, ttl),
        created_at: now,
        used_at: None,
    };
    store.create_password_reset(&token).await?;
    Ok((token, raw_token))
}

/// Complete a password reset: validate the token, then atomically set the new
/// password hash and retire every outstanding token for the user.
#[instrument(skip(store, raw_token, new_password))]
pub async fn complete_password_reset(store: &dyn AuthStore, token_id: TokenId, raw_token: &str, new_password: &str) -> Result<()> {
    let rejection = |fault| Error::InvalidCredential {
        kind: CredentialKind::PasswordReset,
        fault,
    };

    let Some(token) = store.get_password_reset(token_id).await? else {
        return Err(rejection(CredentialFault::NotFound));
    };

    let now = Utc::now();
    if token.used_at.is_some() {
        return Err(rejection(CredentialFault::NotFound));
    }
    if token.expires_at <= now {
        return Err(rejection(CredentialFault::Expired));
    }

    let raw = raw_token.to_string();
    let hash = token.token_hash.clone();
    let matches = tokio::task::spawn_blocking(move || password::verify_string(&raw, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("verify reset token: {e}"),
        })??;
    if !matches {
        return Err(rejection(CredentialFault::NotFound));
    }

    let new_password = new_password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || password::hash_string(&new_password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("hash password: {e}"),
        })??;

    // The store refuses if another confirmation redeemed the token between
    // our read and this write; that raced caller gets the generic rejection.
    if !store
        .complete_password_reset(token.id, token.user_id, &password_hash, now)
        .await?
    {
        return Err(rejection(CredentialFault::NotFound));
    }

    info!(user = %abbrev_uuid(&token.user_id), "password reset completed");
    Ok(())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserCreateRequest, UserStatus};
    use crate::store::MemoryStore;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(600);

    async fn create_pending_user(store: &MemoryStore, email: &str) -> User {
        let role_id = store.seed_role("cashier", &["order:view", "order:create"]);
        store
            .create_user(&UserCreateRequest {
                username: email.split('@').next().unwrap().to_string(),
                email: email.to_string(),
                password_hash: Some(password::hash_string("original-password").unwrap()),
                role_id,
                business_id: Uuid::new_v4(),
                branch_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_email_verification_happy_path() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "pending@example.com").await;
        assert_eq!(user.status, UserStatus::Pending);

        let token = issue_email_verification(&store, TTL, &user.email).await.unwrap();
        let activated = confirm_email(&store, &token.token).await.unwrap();

        assert_eq!(activated.id, user.id);
        assert_eq!(activated.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn test_email_verification_replay_rejected() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "replay@example.com").await;

        let token = issue_email_verification(&store, TTL, &user.email).await.unwrap();
        confirm_email(&store, &token.token).await.unwrap();

        // Second redemption of the same link finds nothing
        let err = confirm_email(&store, &token.token).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCredential {
                kind: CredentialKind::EmailVerification,
                fault: CredentialFault::NotFound
            }
        ));
        assert_eq!(err.user_message(), "Invalid or expired token.");

        // The account stays active, replay changes nothing
        let user = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn test_email_verification_reissue_invalidates_old_token() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "reissue@example.com").await;

        let first = issue_email_verification(&store, TTL, &user.email).await.unwrap();
        let second = issue_email_verification(&store, TTL, &user.email).await.unwrap();
        assert_ne!(first.token, second.token);

        // Old link is dead
        assert!(confirm_email(&store, &first.token).await.is_err());
        // New link still works
        assert!(confirm_email(&store, &second.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_email_token_rejected() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "late@example.com").await;

        let token = issue_email_verification(&store, Duration::ZERO, &user.email).await.unwrap();
        let err = confirm_email(&store, &token.token).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCredential {
                fault: CredentialFault::Expired,
                ..
            }
        ));

        // Account stays pending
        let user = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Pending);
    }

    #[tokio::test]
    async fn test_otp_happy_path() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "otp@example.com").await;

        let otp = issue_otp(&store, TTL, user.id).await.unwrap();
        assert_eq!(otp.code.len(), 6);

        verify_otp(&store, user.id, &otp.code).await.unwrap();

        // Consumed: same code fails now
        assert!(verify_otp(&store, user.id, &otp.code).await.is_err());
    }

    #[tokio::test]
    async fn test_otp_reissue_replaces_previous_code() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "otp2@example.com").await;

        let first = issue_otp(&store, TTL, user.id).await.unwrap();
        let second = issue_otp(&store, TTL, user.id).await.unwrap();

        // Only the newest code is live
        if first.code != second.code {
            let err = verify_otp(&store, user.id, &first.code).await.unwrap_err();
            assert_eq!(err.user_message(), "Invalid or expired code.");
        }
        verify_otp(&store, user.id, &second.code).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_otp_rejected_even_if_code_matches() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "otp3@example.com").await;

        let otp = issue_otp(&store, Duration::ZERO, user.id).await.unwrap();
        let err = verify_otp(&store, user.id, &otp.code).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCredential {
                kind: CredentialKind::Otp,
                fault: CredentialFault::Expired
            }
        ));

        // The stale row is gone, retrying reports not-found
        let err = verify_otp(&store, user.id, &otp.code).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCredential {
                fault: CredentialFault::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wrong_otp_code_rejected() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "otp4@example.com").await;

        let otp = issue_otp(&store, TTL, user.id).await.unwrap();
        let wrong = if otp.code == "482193" { "482194" } else { "482193" };
        assert!(verify_otp(&store, user.id, wrong).await.is_err());

        // Wrong guess doesn't burn the real code
        verify_otp(&store, user.id, &otp.code).await.unwrap();
    }

    #[tokio::test]
    async fn test_password_reset_happy_path() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "reset@example.com").await;

        let (token, raw) = start_password_reset(&store, TTL, &user).await.unwrap();
        complete_password_reset(&store, token.id, &raw, "brand-new-password").await.unwrap();

        let updated = store.get_user_by_id(user.id).await.unwrap().unwrap();
        let hash = updated.password_hash.unwrap();
        assert!(password::verify_string("brand-new-password", &hash).unwrap());
        assert!(!password::verify_string("original-password", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_password_reset_token_single_use() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "reset2@example.com").await;

        let (token, raw) = start_password_reset(&store, TTL, &user).await.unwrap();
        complete_password_reset(&store, token.id, &raw, "first-new-password").await.unwrap();

        let err = complete_password_reset(&store, token.id, &raw, "second-new-password").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid or expired token.");
    }

    #[tokio::test]
    async fn test_password_reset_concurrent_redemptions_only_one_wins() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "reset-race@example.com").await;

        let (token, _raw) = start_password_reset(&store, TTL, &user).await.unwrap();

        // Two confirmations that both read the token while it was still
        // unused: only the first store-level redemption may go through.
        let first = store
            .complete_password_reset(token.id, user.id, &password::hash_string("first-password").unwrap(), Utc::now())
            .await
            .unwrap();
        let second = store
            .complete_password_reset(token.id, user.id, &password::hash_string("second-password").unwrap(), Utc::now())
            .await
            .unwrap();
        assert!(first);
        assert!(!second);

        // The loser did not overwrite the winner's password
        let updated = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(password::verify_string("first-password", &updated.password_hash.unwrap()).unwrap());
    }

    #[tokio::test]
    async fn test_password_reset_wrong_secret_rejected() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "reset3@example.com").await;

        let (token, _raw) = start_password_reset(&store, TTL, &user).await.unwrap();
        let err = complete_password_reset(&store, token.id, "not-the-real-secret", "new-password")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidCredential {
                kind: CredentialKind::PasswordReset,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_password_reset_retires_sibling_tokens() {
        let store = MemoryStore::new();
        let user = create_pending_user(&store, "reset4@example.com").await;

        let (first, first_raw) = start_password_reset(&store, TTL, &user).await.unwrap();
        let (second, second_raw) = start_password_reset(&store, TTL, &user).await.unwrap();

        complete_password_reset(&store, second.id, &second_raw, "newest-password").await.unwrap();

        // The earlier token was retired by the completed reset
        assert!(complete_password_reset(&store, first.id, &first_raw, "stale-password").await.is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"482193", b"482193"));
        assert!(!constant_time_eq(b"482193", b"482194"));
        assert!(!constant_time_eq(b"482193", b"48219"));
        assert!(constant_time_eq(b"", b""));
    }
}
