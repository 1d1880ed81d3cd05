//! OpenAPI documentation for the management and authentication surfaces.

use utoipa::OpenApi;

use crate::api::models::{
    auth::{
        LoginRequest, LoginResponse, OtpRequest, OtpVerifyRequest, PasswordResetConfirmRequest, PasswordResetRequest,
        PasswordResetRequested, VerificationOutcome,
    },
    users::{CurrentUser, RegisterRequest, UserResponse},
};
use crate::models::{Permission, Role, UserStatus};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "backctl API",
        description = "Access control and credential verification for the back-office suite",
    ),
    paths(
        crate::api::handlers::auth::register,
        crate::api::handlers::auth::verify_email,
        crate::api::handlers::auth::login,
        crate::api::handlers::auth::request_otp,
        crate::api::handlers::auth::verify_otp,
        crate::api::handlers::auth::logout,
        crate::api::handlers::auth::request_password_reset,
        crate::api::handlers::auth::confirm_password_reset,
        crate::api::handlers::access::me,
        crate::api::handlers::access::list_roles,
        crate::api::handlers::access::list_permissions,
        crate::api::handlers::access::list_role_permissions,
        crate::api::handlers::access::assign_permission,
        crate::api::handlers::access::unassign_permission,
        crate::api::handlers::access::list_users,
    ),
    components(schemas(
        LoginRequest,
        LoginResponse,
        OtpRequest,
        OtpVerifyRequest,
        PasswordResetRequest,
        PasswordResetRequested,
        PasswordResetConfirmRequest,
        VerificationOutcome,
        RegisterRequest,
        UserResponse,
        CurrentUser,
        Role,
        Permission,
        UserStatus,
    )),
    tags(
        (name = "authentication", description = "Login, registration, and credential verification"),
        (name = "access", description = "Roles, permissions, and user administration"),
    )
)]
pub struct ApiDoc;
