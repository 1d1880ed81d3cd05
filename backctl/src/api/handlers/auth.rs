//! Authentication and verification endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    AppState,
    api::models::{
        auth::{
            LoginRequest, LoginResponse, OtpRequest, OtpVerifyRequest, PasswordResetConfirmRequest, PasswordResetRequest,
            PasswordResetRequested, ResetTokenPath, VerificationOutcome, VerifyEmailQuery,
        },
        users::{CurrentUser, RegisterRequest, UserResponse},
    },
    auth::{destinations, password, session, verification},
    email::EmailService,
    errors::Error,
    models::{User, UserCreateRequest, UserStatus},
};

/// Response that carries a session cookie alongside its JSON body.
pub struct SessionResponse {
    pub body: LoginResponse,
    pub cookie: String,
}

impl IntoResponse for SessionResponse {
    fn into_response(self) -> Response {
        ([(SET_COOKIE, self.cookie)], Json(self.body)).into_response()
    }
}

/// Register a new user account
///
/// The account starts in `pending` status; a verification link is emailed and
/// the account activates when it is redeemed.
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered, verification email sent", body = UserResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "User already exists"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<Response, Error> {
    validate_password(&state, &request.password)?;

    if state.store.get_user_by_email(&request.email).await?.is_some() {
        return Err(Error::BadRequest {
            message: "An account with this email address already exists".to_string(),
        });
    }

    let role = state
        .store
        .get_role_by_title("cashier")
        .await?
        .ok_or_else(|| Error::Internal {
            operation: "look up default role".to_string(),
        })?;

    // Hash the password on a blocking thread to avoid blocking async runtime
    let password = request.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || password::hash_string(&password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })??;

    let created_user = state
        .store
        .create_user(&UserCreateRequest {
            username: request.username,
            email: request.email,
            password_hash: Some(password_hash),
            role_id: role.id,
            business_id: request.business_id,
            branch_id: request.branch_id,
        })
        .await?;

    let token = verification::issue_email_verification(
        state.store.as_ref(),
        state.config.verification.email_token_ttl,
        &created_user.email,
    )
    .await?;

    let email_service = EmailService::new(&state.config)?;
    email_service.send_verification_email(&created_user.email, &token.token).await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(created_user))).into_response())
}

/// Redeem an email verification link
#[utoipa::path(
    get,
    path = "/verify-email",
    tag = "authentication",
    params(("token" = String, Query, description = "Verification token from the email link")),
    responses(
        (status = 303, description = "Email verified, account active; redirects to the sign-in page"),
        (status = 400, description = "Invalid or expired token", body = VerificationOutcome),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Redirect, Error> {
    verification::confirm_email(state.store.as_ref(), &query.token).await?;
    Ok(Redirect::to("/login?verified=true"))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<SessionResponse, Error> {
    let user = state
        .store
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    let password_hash = user.password_hash.as_ref().ok_or_else(invalid_credentials)?;

    // Verify password on a blocking thread to avoid blocking async runtime
    let password = request.password.clone();
    let hash = password_hash.clone();
    let is_valid = tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(invalid_credentials());
    }

    match user.status {
        UserStatus::Active => {}
        UserStatus::Pending => {
            return Err(Error::Unauthenticated {
                message: Some("Please verify your email address before logging in.".to_string()),
            });
        }
        UserStatus::Suspended => {
            return Err(Error::Unauthenticated {
                message: Some("This account is suspended.".to_string()),
            });
        }
    }

    issue_session(&state, &user).await
}

/// Request a one-time passcode by email
///
/// Always answers 200 so responses cannot reveal which addresses exist.
#[utoipa::path(
    post,
    path = "/authentication/otp",
    request_body = OtpRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "If the account exists, a passcode has been sent", body = VerificationOutcome),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_otp(State(state): State<AppState>, Json(request): Json<OtpRequest>) -> Result<Json<VerificationOutcome>, Error> {
    if let Some(user) = state.store.get_user_by_email(&request.email).await?
        && user.is_active()
    {
        let otp = verification::issue_otp(state.store.as_ref(), state.config.verification.otp_ttl, user.id).await?;

        let email_service = EmailService::new(&state.config)?;
        let ttl_minutes = state.config.verification.otp_ttl.as_secs() / 60;
        email_service.send_otp_email(&user.email, &otp.code, ttl_minutes).await?;
    }

    Ok(Json(VerificationOutcome::ok(
        "If an account with that email exists, a passcode has been sent.",
    )))
}

/// Redeem a one-time passcode and open a session
#[utoipa::path(
    post,
    path = "/authentication/otp/verify",
    request_body = OtpVerifyRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Passcode accepted", body = LoginResponse),
        (status = 400, description = "Invalid or expired code", body = VerificationOutcome),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn verify_otp(State(state): State<AppState>, Json(request): Json<OtpVerifyRequest>) -> Result<SessionResponse, Error> {
    use crate::errors::{CredentialFault, CredentialKind};

    // Unknown and inactive accounts get the same rejection as a wrong code
    let user = state
        .store
        .get_user_by_email(&request.email)
        .await?
        .filter(|u| u.is_active())
        .ok_or(Error::InvalidCredential {
            kind: CredentialKind::Otp,
            fault: CredentialFault::NotFound,
        })?;

    verification::verify_otp(state.store.as_ref(), user.id, &request.code).await?;

    issue_session(&state, &user).await
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = VerificationOutcome),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<Response, Error> {
    // Expired cookie clears the session client-side; the JWT itself simply
    // ages out
    let cookie = format!(
        "{}=; Path=/; HttpOnly; Secure={}; SameSite=Strict; Max-Age=0",
        state.config.auth.cookie_name, state.config.auth.cookie_secure
    );

    Ok((
        [(SET_COOKIE, cookie)],
        Json(VerificationOutcome::ok("Logout successful")),
    )
        .into_response())
}

/// Request password reset (send email)
#[utoipa::path(
    post,
    path = "/authentication/password-resets",
    request_body = PasswordResetRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password reset email sent if the account exists", body = PasswordResetRequested),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetRequested>, Error> {
    // Only send email if the user actually exists; the response is the same
    // either way to avoid email enumeration
    if let Some(user) = state.store.get_user_by_email(&request.email).await?
        && user.password_hash.is_some()
    {
        let (token, raw_token) =
            verification::start_password_reset(state.store.as_ref(), state.config.verification.reset_token_ttl, &user).await?;

        let email_service = EmailService::new(&state.config)?;
        email_service.send_password_reset_email(&user.email, &token.id, &raw_token).await?;
    }

    Ok(Json(PasswordResetRequested {
        message: "If an account with that email exists, a password reset link has been sent.".to_string(),
    }))
}

/// Confirm password reset with token
#[utoipa::path(
    post,
    path = "/authentication/password-resets/{token_id}/confirm",
    request_body = PasswordResetConfirmRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Password reset successful", body = PasswordResetRequested),
        (status = 400, description = "Invalid or expired token", body = VerificationOutcome),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Path(path): Path<ResetTokenPath>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<PasswordResetRequested>, Error> {
    validate_password(&state, &request.new_password)?;

    verification::complete_password_reset(state.store.as_ref(), path.token_id, &request.token, &request.new_password).await?;

    Ok(Json(PasswordResetRequested {
        message: "Password has been reset successfully".to_string(),
    }))
}

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

fn validate_password(state: &AppState, password: &str) -> Result<(), Error> {
    let auth = &state.config.auth;
    if password.len() < auth.password_min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", auth.password_min_length),
        });
    }
    if password.len() > auth.password_max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", auth.password_max_length),
        });
    }
    Ok(())
}

/// Build session claims for a user and wrap them in a cookie-bearing response.
async fn issue_session(state: &AppState, user: &User) -> Result<SessionResponse, Error> {
    let role = state.store.get_role(user.role_id).await?.ok_or_else(|| Error::Internal {
        operation: "look up role for session".to_string(),
    })?;
    let permissions = state.store.permissions_for_role(user.role_id).await?;

    let current_user = CurrentUser {
        id: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
        role_id: role.id,
        role_title: role.title,
        business_id: user.business_id,
        branch_id: user.branch_id,
        permissions,
    };

    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);
    let destination = destinations::destination_for(&current_user);

    Ok(SessionResponse {
        body: LoginResponse { destination },
        cookie,
    })
}

/// Helper function to create a session cookie
fn create_session_cookie(token: &str, config: &crate::config::Config) -> String {
    let max_age = config.auth.jwt_expiry.as_secs();

    format!(
        "{}={}; Path=/; HttpOnly; Secure={}; SameSite=Strict; Max-Age={}",
        config.auth.cookie_name, token, config.auth.cookie_secure, max_age
    )
}
