//! Role, permission, and user administration endpoints.
//!
//! The navigation gate has already vetted the route by the time these run;
//! each handler still calls [`guard::require`] so the check holds even when a
//! handler is reached through a path the route table does not cover.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::{
    AppState,
    api::models::users::{CurrentUser, UserResponse},
    auth::guard,
    errors::Error,
    models::{Permission, Role},
    types::RoleId,
};

/// Path parameters for role-permission assignment endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct RolePermissionPath {
    pub role_id: RoleId,
    pub code: String,
}

/// List all roles
#[utoipa::path(
    get,
    path = "/roles",
    tag = "access",
    responses(
        (status = 200, description = "List of roles", body = Vec<Role>),
        (status = 403, description = "Missing role:view permission"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_roles(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Role>>, Error> {
    guard::require(&user, &["role:view"])?;
    let roles = state.store.list_roles().await?;
    Ok(Json(roles))
}

/// List the permission catalog
#[utoipa::path(
    get,
    path = "/permissions",
    tag = "access",
    responses(
        (status = 200, description = "List of permissions", body = Vec<Permission>),
        (status = 403, description = "Missing role:view permission"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_permissions(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Permission>>, Error> {
    guard::require(&user, &["role:view"])?;
    let permissions = state.store.list_permissions().await?;
    Ok(Json(permissions))
}

/// List the permissions assigned to a role
#[utoipa::path(
    get,
    path = "/roles/{role_id}/permissions",
    tag = "access",
    params(("role_id" = String, Path, description = "Role to inspect")),
    responses(
        (status = 200, description = "Permission codes assigned to the role", body = Vec<String>),
        (status = 403, description = "Missing role:view permission"),
        (status = 404, description = "Role not found"),
    )
)]
#[tracing::instrument(skip_all, fields(role_id = %role_id))]
pub async fn list_role_permissions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(role_id): Path<RoleId>,
) -> Result<Json<Vec<String>>, Error> {
    guard::require(&user, &["role:view"])?;

    state.store.get_role(role_id).await?.ok_or_else(|| Error::NotFound {
        resource: "role".to_string(),
        id: role_id.to_string(),
    })?;

    let permissions = state.store.permissions_for_role(role_id).await?;
    Ok(Json(permissions))
}

/// Assign a permission to a role
///
/// Idempotent: assigning a permission the role already holds is a no-op.
#[utoipa::path(
    post,
    path = "/roles/{role_id}/permissions/{code}",
    tag = "access",
    params(
        ("role_id" = String, Path, description = "Role to grant the permission to"),
        ("code" = String, Path, description = "Permission code, e.g. `order:create`"),
    ),
    responses(
        (status = 204, description = "Permission assigned"),
        (status = 403, description = "Missing role:update permission"),
        (status = 404, description = "Role or permission not found"),
    )
)]
#[tracing::instrument(skip_all, fields(role_id = %path.role_id, code = %path.code))]
pub async fn assign_permission(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(path): Path<RolePermissionPath>,
) -> Result<StatusCode, Error> {
    guard::require(&user, &["role:update"])?;

    state.store.get_role(path.role_id).await?.ok_or_else(|| Error::NotFound {
        resource: "role".to_string(),
        id: path.role_id.to_string(),
    })?;

    state.store.assign_permission(path.role_id, &path.code).await?;
    tracing::info!("permission assigned");
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a permission from a role
#[utoipa::path(
    delete,
    path = "/roles/{role_id}/permissions/{code}",
    tag = "access",
    params(
        ("role_id" = String, Path, description = "Role to revoke the permission from"),
        ("code" = String, Path, description = "Permission code, e.g. `order:create`"),
    ),
    responses(
        (status = 204, description = "Permission removed"),
        (status = 403, description = "Missing role:update permission"),
        (status = 404, description = "Role did not hold the permission"),
    )
)]
#[tracing::instrument(skip_all, fields(role_id = %path.role_id, code = %path.code))]
pub async fn unassign_permission(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(path): Path<RolePermissionPath>,
) -> Result<StatusCode, Error> {
    guard::require(&user, &["role:update"])?;

    let removed = state.store.unassign_permission(path.role_id, &path.code).await?;
    if !removed {
        return Err(Error::NotFound {
            resource: "role permission".to_string(),
            id: format!("{}/{}", path.role_id, path.code),
        });
    }

    tracing::info!("permission removed");
    Ok(StatusCode::NO_CONTENT)
}

/// List users in the caller's business
#[utoipa::path(
    get,
    path = "/users",
    tag = "access",
    responses(
        (status = 200, description = "Users in the caller's business", body = Vec<UserResponse>),
        (status = 403, description = "Missing user:view permission"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<UserResponse>>, Error> {
    guard::require(&user, &["user:view"])?;

    let users = state.store.list_users(user.business_id).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// The caller's own identity and permission set
#[utoipa::path(
    get,
    path = "/me",
    tag = "access",
    responses(
        (status = 200, description = "Current user claims", body = CurrentUser),
        (status = 401, description = "Not logged in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn me(user: CurrentUser) -> Json<CurrentUser> {
    Json(user)
}
