// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payout transaction and spending-limit endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::Auth,
    error::ApiError,
    finance::{CreateTransaction, FinancialLimits, TransactionView, UsageCounter},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RejectTransactionRequest {
    /// Shown to the child.
    pub reason: String,
}

/// Query parameters for transaction history.
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Look-back window in days (default: 30)
    #[param(default = 30)]
    pub window_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionListResponse {
    /// Newest first.
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PayoutKeyResponse {
    pub payout_key: String,
}

const DEFAULT_HISTORY_DAYS: u32 = 30;

// =============================================================================
// Transaction Handlers
// =============================================================================

/// Request a payout. The caller must be the parent or the child named in it.
#[utoipa::path(
    post,
    path = "/v1/transactions",
    tag = "Transactions",
    request_body = CreateTransaction,
    responses(
        (status = 201, description = "Transaction pending approval", body = TransactionView),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Not allowed"),
        (status = 422, description = "Limit exceeded or risk rejected")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_transaction(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Json(request): Json<CreateTransaction>,
) -> Result<(StatusCode, Json<TransactionView>), ApiError> {
    let view = state
        .core
        .finance
        .create_transaction(&caller.principal_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[utoipa::path(
    get,
    path = "/v1/transactions/{transaction_id}",
    tag = "Transactions",
    params(("transaction_id" = String, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction", body = TransactionView),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "Unknown transaction")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_transaction(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let view = state
        .core
        .finance
        .get_transaction(&caller.principal_id, &transaction_id)
        .await?;
    Ok(Json(view))
}

/// Approve a pending payout. Needs a verified second factor.
#[utoipa::path(
    post,
    path = "/v1/transactions/{transaction_id}/approve",
    tag = "Transactions",
    params(("transaction_id" = String, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Approved", body = TransactionView),
        (status = 403, description = "Not allowed or no verified session"),
        (status = 409, description = "Transaction is not pending")
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_transaction(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let view = state
        .core
        .finance
        .approve_transaction(&transaction_id, &caller.principal_id)
        .await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/v1/transactions/{transaction_id}/reject",
    tag = "Transactions",
    params(("transaction_id" = String, Path, description = "Transaction id")),
    request_body = RejectTransactionRequest,
    responses(
        (status = 200, description = "Rejected", body = TransactionView),
        (status = 403, description = "Not allowed"),
        (status = 409, description = "Transaction is not pending")
    ),
    security(("bearer_auth" = []))
)]
pub async fn reject_transaction(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
    Json(request): Json<RejectTransactionRequest>,
) -> Result<Json<TransactionView>, ApiError> {
    let view = state
        .core
        .finance
        .reject_transaction(&transaction_id, &caller.principal_id, &request.reason)
        .await?;
    Ok(Json(view))
}

/// Withdraw a pending payout. Only its requester may cancel.
#[utoipa::path(
    post,
    path = "/v1/transactions/{transaction_id}/cancel",
    tag = "Transactions",
    params(("transaction_id" = String, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Cancelled", body = TransactionView),
        (status = 403, description = "Not allowed"),
        (status = 409, description = "Transaction is not pending")
    ),
    security(("bearer_auth" = []))
)]
pub async fn cancel_transaction(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let view = state
        .core
        .finance
        .cancel_transaction(&transaction_id, &caller.principal_id)
        .await?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/v1/transactions/{transaction_id}/payout-key",
    tag = "Transactions",
    params(("transaction_id" = String, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Plain payout key", body = PayoutKeyResponse),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn reveal_payout_key(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PayoutKeyResponse>, ApiError> {
    let payout_key = state
        .core
        .finance
        .reveal_payout_key(&caller.principal_id, &transaction_id)
        .await?;
    Ok(Json(PayoutKeyResponse { payout_key }))
}

/// A family's transactions within the window. Children see only their own.
#[utoipa::path(
    get,
    path = "/v1/families/{parent_id}/transactions",
    tag = "Transactions",
    params(
        ("parent_id" = String, Path, description = "Parent principal id"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "Transactions", body = TransactionListResponse),
        (status = 400, description = "Window out of range"),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn transaction_history(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let window_days = query.window_days.unwrap_or(DEFAULT_HISTORY_DAYS);
    let transactions = state
        .core
        .finance
        .get_history(&caller.principal_id, &parent_id, window_days)
        .await?;
    Ok(Json(TransactionListResponse { transactions }))
}

// =============================================================================
// Limit Handlers
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/families/{parent_id}/limits",
    tag = "Limits",
    params(("parent_id" = String, Path, description = "Parent principal id")),
    responses(
        (status = 200, description = "Effective limits", body = FinancialLimits),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_limits(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
) -> Result<Json<FinancialLimits>, ApiError> {
    let limits = state
        .core
        .finance
        .limits(&caller.principal_id, &parent_id)
        .await?;
    Ok(Json(limits))
}

/// Replace a family's limits. The parent needs a verified second factor.
#[utoipa::path(
    put,
    path = "/v1/families/{parent_id}/limits",
    tag = "Limits",
    params(("parent_id" = String, Path, description = "Parent principal id")),
    request_body = FinancialLimits,
    responses(
        (status = 200, description = "Saved limits", body = FinancialLimits),
        (status = 400, description = "Inconsistent limits"),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn put_limits(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
    Json(limits): Json<FinancialLimits>,
) -> Result<Json<FinancialLimits>, ApiError> {
    let saved = state
        .core
        .finance
        .set_limits(&caller.principal_id, &parent_id, limits)
        .await?;
    Ok(Json(saved))
}

/// Today's and this month's committed totals.
#[utoipa::path(
    get,
    path = "/v1/families/{parent_id}/usage",
    tag = "Limits",
    params(("parent_id" = String, Path, description = "Parent principal id")),
    responses(
        (status = 200, description = "Usage counters", body = UsageCounter),
        (status = 403, description = "Not allowed")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_usage(
    Auth(caller): Auth,
    State(state): State<AppState>,
    Path(parent_id): Path<String>,
) -> Result<Json<UsageCounter>, ApiError> {
    let usage = state
        .core
        .finance
        .usage(&caller.principal_id, &parent_id)
        .await?;
    Ok(Json(usage))
}
