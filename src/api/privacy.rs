// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Privacy settings, data-access logs, subject rights and retention.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    privacy::{
        CleanupReport, DataAccessLog, ErasureReport, ExportReceipt, PrivacySettings,
        RetentionPolicy, UserDataExport,
    },
    state::AppState,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DataLogResponse {
    pub entries: Vec<DataAccessLog>,
}

/// Stored settings or the role's defaults.
#[utoipa::path(
    get,
    path = "/v1/privacy/{principal_id}/settings",
    tag = "Privacy",
    params(("principal_id" = String, Path, description = "Subject principal id")),
    responses(
        (status = 200, description = "Privacy settings", body = PrivacySettings),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_settings(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
) -> Result<Json<PrivacySettings>, ApiError> {
    let settings = state
        .core
        .privacy
        .get_settings(&caller.principal_id, &principal_id)
        .await?;
    Ok(Json(settings))
}

#[utoipa::path(
    put,
    path = "/v1/privacy/{principal_id}/settings",
    tag = "Privacy",
    params(("principal_id" = String, Path, description = "Subject principal id")),
    request_body = PrivacySettings,
    responses(
        (status = 200, description = "Saved settings", body = PrivacySettings),
        (status = 400, description = "Settings not allowed for this role"),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn put_settings(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
    Json(settings): Json<PrivacySettings>,
) -> Result<Json<PrivacySettings>, ApiError> {
    let saved = state
        .core
        .privacy
        .set_settings(&caller.principal_id, &principal_id, settings)
        .await?;
    Ok(Json(saved))
}

/// The subject's bounded data-access log, oldest first.
#[utoipa::path(
    get,
    path = "/v1/privacy/{principal_id}/logs",
    tag = "Privacy",
    params(("principal_id" = String, Path, description = "Subject principal id")),
    responses(
        (status = 200, description = "Data access log", body = DataLogResponse),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn data_logs(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
) -> Result<Json<DataLogResponse>, ApiError> {
    let entries = state
        .core
        .privacy
        .data_logs(&caller.principal_id, &principal_id)
        .await?;
    Ok(Json(DataLogResponse { entries }))
}

/// Write a sealed export of everything held about the subject.
#[utoipa::path(
    post,
    path = "/v1/privacy/{principal_id}/export",
    tag = "Privacy",
    params(("principal_id" = String, Path, description = "Subject principal id")),
    responses(
        (status = 201, description = "Export written", body = ExportReceipt),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn export_data(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
) -> Result<(StatusCode, Json<ExportReceipt>), ApiError> {
    let receipt = state
        .core
        .privacy
        .export_user_data(&caller.principal_id, &principal_id)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

#[utoipa::path(
    get,
    path = "/v1/privacy/exports/{handle}",
    tag = "Privacy",
    params(("handle" = String, Path, description = "Export handle from the receipt")),
    responses(
        (status = 200, description = "Export contents", body = UserDataExport),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "No such export")
    ),
    security(("bearer_auth" = []))
)]
pub async fn read_export(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<UserDataExport>, ApiError> {
    let export = state
        .core
        .privacy
        .read_export(&caller.principal_id, &handle)
        .await?;
    Ok(Json(export))
}

/// Erase every sealed record and export of the subject.
#[utoipa::path(
    delete,
    path = "/v1/privacy/{principal_id}/data",
    tag = "Privacy",
    params(("principal_id" = String, Path, description = "Subject principal id")),
    responses(
        (status = 200, description = "Data erased", body = ErasureReport),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn erase_data(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
) -> Result<Json<ErasureReport>, ApiError> {
    let report = state
        .core
        .privacy
        .erase_user_data(&caller.principal_id, &principal_id)
        .await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/v1/privacy/retention",
    tag = "Privacy",
    responses(
        (status = 200, description = "Current retention policy", body = RetentionPolicy)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_retention_policy(
    Auth(_caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<RetentionPolicy>, ApiError> {
    Ok(Json(state.core.privacy.retention_policy().await?))
}

/// Replace the retention policy. Needs `manage_system`.
#[utoipa::path(
    put,
    path = "/v1/privacy/retention",
    tag = "Privacy",
    request_body = RetentionPolicy,
    responses(
        (status = 200, description = "Saved policy", body = RetentionPolicy),
        (status = 400, description = "Invalid policy"),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn put_retention_policy(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(policy): Json<RetentionPolicy>,
) -> Result<Json<RetentionPolicy>, ApiError> {
    let saved = state
        .core
        .privacy
        .set_retention_policy(&caller.principal_id, policy)
        .await?;
    Ok(Json(saved))
}

/// Run retention cleanup now. Needs `manage_system`.
#[utoipa::path(
    post,
    path = "/v1/privacy/retention/cleanup",
    tag = "Privacy",
    responses(
        (status = 200, description = "Cleanup report", body = CleanupReport),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn run_cleanup(
    Auth(caller): Auth,
    State(state): State<AppState>,
) -> Result<Json<CleanupReport>, ApiError> {
    let report = state.core.privacy.cleanup_as(&caller.principal_id).await?;
    Ok(Json(report))
}
