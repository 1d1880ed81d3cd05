//! API models for authentication and verification flows.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::TokenId;

/// Login request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response body. `destination` is the role-appropriate landing path.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub destination: String,
}

/// Request body for issuing a one-time passcode
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OtpRequest {
    pub email: String,
}

/// Request body for redeeming a one-time passcode
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub code: String,
}

/// Outcome body shared by the verification endpoints.
///
/// Failures carry `success: false` and a generic message so responses cannot
/// be used to probe which addresses or tokens exist.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerificationOutcome {
    pub success: bool,
    pub message: String,
}

impl VerificationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Request body for starting a password reset
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Response for a password reset request. Always 200 regardless of whether
/// the address is known.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PasswordResetRequested {
    pub message: String,
}

/// Request body for completing a password reset
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

/// Path parameters for password reset confirmation
#[derive(Debug, Clone, Deserialize)]
pub struct ResetTokenPath {
    pub token_id: TokenId,
}

/// Query parameters for the email verification link
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}
