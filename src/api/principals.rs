// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal, permission and audit log endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    access::{AccessLogEntry, Permission, Principal, Role},
    auth::Auth,
    error::ApiError,
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePrincipalRequest {
    pub principal_id: String,
    pub role: Role,
    /// Required for a child: the guardian it is linked to.
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PermissionChangeRequest {
    pub permission: Permission,
    /// `true` grants, `false` revokes.
    pub granted: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PermissionCheckRequest {
    /// Defaults to the caller.
    #[serde(default)]
    pub principal_id: Option<String>,
    pub permission: Permission,
    #[serde(default)]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Restrict to one principal.
    pub principal_id: Option<String>,
    /// Maximum number of entries (default: 100)
    #[param(default = 100)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub entries: Vec<AccessLogEntry>,
}

const MAX_AUDIT_LIMIT: usize = 1000;

// =============================================================================
// Handlers
// =============================================================================

/// Create a principal.
///
/// Parents may register themselves and their children; anything else needs
/// `manage_users`.
#[utoipa::path(
    post,
    path = "/v1/principals",
    tag = "Principals",
    request_body = CreatePrincipalRequest,
    responses(
        (status = 201, description = "Principal created", body = Principal),
        (status = 400, description = "Invalid principal"),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_principal(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreatePrincipalRequest>,
) -> Result<(StatusCode, Json<Principal>), ApiError> {
    let principal = state
        .core
        .engine
        .create_principal_as(
            &caller.principal_id,
            &request.principal_id,
            request.role,
            request.parent_id.as_deref(),
            request.child_id.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(principal)))
}

/// Record a sign-in for the caller and return its principal.
#[utoipa::path(
    post,
    path = "/v1/principals/me/login",
    tag = "Principals",
    responses(
        (status = 200, description = "Login recorded", body = Principal),
        (status = 403, description = "Principal inactive")
    ),
    security(("bearer_auth" = []))
)]
pub async fn login(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<Principal>, ApiError> {
    let principal = state.core.engine.touch_login(&caller.principal_id).await?;
    Ok(Json(principal))
}

/// Advisory view of a principal (may be briefly stale).
#[utoipa::path(
    get,
    path = "/v1/principals/{principal_id}",
    tag = "Principals",
    params(("principal_id" = String, Path, description = "Principal id")),
    responses(
        (status = 200, description = "Principal", body = Principal),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Unknown principal")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_principal(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
) -> Result<Json<Principal>, ApiError> {
    let engine = &state.core.engine;
    let allowed = caller.principal_id == principal_id
        || engine
            .check_permission(
                &caller.principal_id,
                Permission::ReadChildData,
                Some(&principal_id),
            )
            .await
        || engine
            .check_permission(&caller.principal_id, Permission::ManageUsers, None)
            .await;
    if !allowed {
        return Err(ApiError::forbidden("not allowed to view this principal"));
    }

    engine
        .cached_principal(&principal_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("principal {principal_id}")))
}

/// Grant or revoke one permission. Needs `manage_users`.
#[utoipa::path(
    post,
    path = "/v1/principals/{principal_id}/permissions",
    tag = "Principals",
    params(("principal_id" = String, Path, description = "Principal id")),
    request_body = PermissionChangeRequest,
    responses(
        (status = 200, description = "Updated principal", body = Principal),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_permission(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
    Json(request): Json<PermissionChangeRequest>,
) -> Result<Json<Principal>, ApiError> {
    let engine = &state.core.engine;
    let principal = if request.granted {
        engine
            .grant_permission(&caller.principal_id, &principal_id, request.permission)
            .await?
    } else {
        engine
            .revoke_permission(&caller.principal_id, &principal_id, request.permission)
            .await?
    };
    Ok(Json(principal))
}

/// Deactivate a principal. Every later permission check for it is denied.
#[utoipa::path(
    post,
    path = "/v1/principals/{principal_id}/deactivate",
    tag = "Principals",
    params(("principal_id" = String, Path, description = "Principal id")),
    responses(
        (status = 200, description = "Deactivated principal", body = Principal),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn deactivate_principal(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
) -> Result<Json<Principal>, ApiError> {
    let principal = state
        .core
        .engine
        .deactivate(&caller.principal_id, &principal_id)
        .await?;
    Ok(Json(principal))
}

/// Evaluate a permission. Checking another principal needs `manage_users`.
#[utoipa::path(
    post,
    path = "/v1/permissions/check",
    tag = "Principals",
    request_body = PermissionCheckRequest,
    responses(
        (status = 200, description = "Decision", body = PermissionCheckResponse),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn check_permission(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<PermissionCheckRequest>,
) -> Result<Json<PermissionCheckResponse>, ApiError> {
    let engine = &state.core.engine;
    let subject = request
        .principal_id
        .unwrap_or_else(|| caller.principal_id.clone());
    if subject != caller.principal_id
        && !engine
            .check_permission(&caller.principal_id, Permission::ManageUsers, None)
            .await
    {
        return Err(ApiError::forbidden("manage_users required to check others"));
    }

    let allowed = engine
        .check_permission(&subject, request.permission, request.resource_id.as_deref())
        .await;
    Ok(Json(PermissionCheckResponse { allowed }))
}

/// Newest-first access log. Needs `view_logs`.
#[utoipa::path(
    get,
    path = "/v1/audit",
    tag = "Principals",
    params(AuditQuery),
    responses(
        (status = 200, description = "Access log entries", body = AuditLogResponse),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn query_audit_log(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let limit = query.limit.unwrap_or(100).min(MAX_AUDIT_LIMIT);
    let entries = state
        .core
        .engine
        .query_log(&caller.principal_id, query.principal_id.as_deref(), limit)
        .await?;
    Ok(Json(AuditLogResponse { entries }))
}

/// Access log entries about one principal: the principal itself or `view_logs`.
#[utoipa::path(
    get,
    path = "/v1/principals/{principal_id}/audit",
    tag = "Principals",
    params(("principal_id" = String, Path, description = "Principal id")),
    responses(
        (status = 200, description = "Access log entries", body = AuditLogResponse),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn principal_audit_log(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let entries = state
        .core
        .engine
        .entries_for(&caller.principal_id, &principal_id)
        .await?;
    Ok(Json(AuditLogResponse { entries }))
}
