// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the trust core and its HTTP mapping.
//!
//! Permission and financial-policy failures are ordinary outcomes returned as
//! typed errors. Cryptographic and state-machine violations are never
//! downgraded: they surface as `Integrity` and `InvalidState`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::authority::AuthorityError;
use crate::finance::{RiskLevel, TransactionStatus};
use crate::vault::VaultError;

/// Which financial limit a transaction request ran into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitViolation {
    /// Single transaction above `max_transaction_amount`.
    Transaction { limit: u64, requested: u64 },
    /// Today's total would pass `max_daily_amount`.
    Daily { limit: u64, used: u64, requested: u64 },
    /// Month-to-date total would pass `max_monthly_amount`.
    Monthly { limit: u64, used: u64, requested: u64 },
}

impl std::fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitViolation::Transaction { limit, requested } => write!(
                f,
                "amount {requested} exceeds the per-transaction limit of {limit}"
            ),
            LimitViolation::Daily {
                limit,
                used,
                requested,
            } => write!(
                f,
                "daily limit of {limit} would be exceeded ({used} already used, {requested} requested)"
            ),
            LimitViolation::Monthly {
                limit,
                used,
                requested,
            } => write!(
                f,
                "monthly limit of {limit} would be exceeded ({used} already used, {requested} requested)"
            ),
        }
    }
}

/// Core error type shared by every component.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// Permission check failed (fail closed).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Decryption or authentication failure. Never carries plaintext.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(LimitViolation),

    #[error("transaction rejected by risk assessment ({level}): {reason}")]
    RiskRejected { level: RiskLevel, reason: String },

    /// Transition attempted on a transaction that is no longer pending.
    #[error("transaction {transaction_id} is {status}, expected pending")]
    InvalidState {
        transaction_id: String,
        status: TransactionStatus,
    },

    /// Authoritative round-trip failed; no local state was changed.
    #[error("authority unreachable: {0}")]
    Network(String),

    #[error("invalid credential")]
    InvalidCredential,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl TrustError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        TrustError::Unauthorized(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        TrustError::InvalidInput(message.into())
    }

    /// Stable machine-readable code, used in API bodies and audit details.
    pub fn error_code(&self) -> &'static str {
        match self {
            TrustError::Unauthorized(_) => "unauthorized",
            TrustError::Integrity(_) => "integrity_error",
            TrustError::LimitExceeded(_) => "limit_exceeded",
            TrustError::RiskRejected { .. } => "risk_rejected",
            TrustError::InvalidState { .. } => "invalid_state",
            TrustError::Network(_) => "network_error",
            TrustError::InvalidCredential => "invalid_credential",
            TrustError::NotFound(_) => "not_found",
            TrustError::InvalidInput(_) => "invalid_input",
            TrustError::Storage(_) => "storage_error",
        }
    }
}

impl From<VaultError> for TrustError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Integrity => TrustError::Integrity(e.to_string()),
            VaultError::NotFound(what) => TrustError::NotFound(what),
            other => TrustError::Storage(other.to_string()),
        }
    }
}

impl From<AuthorityError> for TrustError {
    fn from(e: AuthorityError) -> Self {
        match e {
            AuthorityError::Network(msg) => TrustError::Network(msg),
            AuthorityError::NotFound(what) => TrustError::NotFound(what),
            AuthorityError::Conflict {
                transaction_id,
                status,
            } => TrustError::InvalidState {
                transaction_id,
                status,
            },
            AuthorityError::Rejected(msg) => TrustError::InvalidInput(msg),
            other => TrustError::Storage(other.to_string()),
        }
    }
}

/// Result alias for core operations.
pub type TrustResult<T> = Result<T, TrustError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "unauthorized", message)
    }
}

impl From<TrustError> for ApiError {
    fn from(e: TrustError) -> Self {
        let status = match &e {
            TrustError::Unauthorized(_) => StatusCode::FORBIDDEN,
            TrustError::InvalidCredential => StatusCode::UNAUTHORIZED,
            TrustError::LimitExceeded(_) | TrustError::RiskRejected { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TrustError::InvalidState { .. } => StatusCode::CONFLICT,
            TrustError::NotFound(_) => StatusCode::NOT_FOUND,
            TrustError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TrustError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            TrustError::Integrity(_) | TrustError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Internal failures keep their detail in the logs, not the response.
        let message = match &e {
            TrustError::Integrity(_) | TrustError::Storage(_) => {
                tracing::warn!(error = %e, "internal error surfaced to API");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        Self::new(status, e.error_code(), message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}
