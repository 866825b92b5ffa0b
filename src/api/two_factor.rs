// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian second-factor endpoints. The caller is always the subject.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    two_factor::{Enrollment, TwoFactorStatus},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EnrollRequest {
    /// Where codes are delivered (email or phone).
    pub contact: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BackupCodesResponse {
    /// Shown once; only digests are stored.
    pub backup_codes: Vec<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Enroll the caller. Guardians only.
#[utoipa::path(
    post,
    path = "/v1/2fa/enroll",
    tag = "TwoFactor",
    request_body = EnrollRequest,
    responses(
        (status = 201, description = "Enrolled; secret and codes shown once", body = Enrollment),
        (status = 400, description = "Invalid contact"),
        (status = 403, description = "Not a guardian, or re-enrollment without a verified session")
    ),
    security(("bearer_auth" = []))
)]
pub async fn enroll(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<Enrollment>), ApiError> {
    let enrollment = state
        .core
        .two_factor
        .enroll(&caller.principal_id, &request.contact)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// Verify a TOTP code and open a verified session.
#[utoipa::path(
    post,
    path = "/v1/2fa/verify",
    tag = "TwoFactor",
    request_body = VerifyCodeRequest,
    responses(
        (status = 204, description = "Verified"),
        (status = 401, description = "Code rejected")
    ),
    security(("bearer_auth" = []))
)]
pub async fn verify(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .core
        .two_factor
        .verify_code(&caller.principal_id, &request.code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Spend one backup code and open a verified session.
#[utoipa::path(
    post,
    path = "/v1/2fa/verify-backup",
    tag = "TwoFactor",
    request_body = VerifyCodeRequest,
    responses(
        (status = 204, description = "Verified"),
        (status = 401, description = "Code rejected or already used")
    ),
    security(("bearer_auth" = []))
)]
pub async fn verify_backup(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .core
        .two_factor
        .verify_backup_code(&caller.principal_id, &request.code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/2fa/status",
    tag = "TwoFactor",
    responses(
        (status = 200, description = "Second-factor status", body = TwoFactorStatus)
    ),
    security(("bearer_auth" = []))
)]
pub async fn status(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<TwoFactorStatus>, ApiError> {
    Ok(Json(state.core.two_factor.status(&caller.principal_id).await?))
}

#[utoipa::path(
    post,
    path = "/v1/2fa/disable",
    tag = "TwoFactor",
    responses(
        (status = 204, description = "Second factor removed"),
        (status = 403, description = "No verified session")
    ),
    security(("bearer_auth" = []))
)]
pub async fn disable(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.core.two_factor.disable(&caller.principal_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/2fa/backup-codes",
    tag = "TwoFactor",
    responses(
        (status = 200, description = "Fresh backup codes", body = BackupCodesResponse),
        (status = 403, description = "No verified session"),
        (status = 404, description = "Not enrolled")
    ),
    security(("bearer_auth" = []))
)]
pub async fn regenerate_backup_codes(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<BackupCodesResponse>, ApiError> {
    let backup_codes = state
        .core
        .two_factor
        .regenerate_backup_codes(&caller.principal_id)
        .await?;
    Ok(Json(BackupCodesResponse { backup_codes }))
}

/// Drop the caller's verified session.
#[utoipa::path(
    delete,
    path = "/v1/2fa/session",
    tag = "TwoFactor",
    responses((status = 204, description = "Session ended")),
    security(("bearer_auth" = []))
)]
pub async fn end_session(Auth(caller): Auth, State(state): State<AppState>) -> StatusCode {
    state.core.two_factor.end_session(&caller.principal_id);
    StatusCode::NO_CONTENT
}
