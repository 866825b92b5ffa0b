// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tagged-union wire format of the authority channel.
//!
//! Requests carry an `op` tag; responses a `kind` tag with `data`. Payloads
//! are decoded once at this edge into the typed entities and never handled
//! as loose JSON past it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuthorityBackend, AuthorityError, AuthorityResult};
use crate::access::{Permission, Principal};
use crate::finance::{Transaction, TransactionStatus, TransactionUpdate};
use crate::privacy::RetentionPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AuthorityRequest {
    CreatePrincipal {
        principal: Principal,
    },
    GetPrincipal {
        principal_id: String,
    },
    SetPermission {
        principal_id: String,
        permission: Permission,
        granted: bool,
    },
    DeactivatePrincipal {
        principal_id: String,
    },
    TouchLogin {
        principal_id: String,
        at: DateTime<Utc>,
    },
    SubmitTransaction {
        transaction: Transaction,
    },
    GetTransaction {
        transaction_id: String,
    },
    TransitionTransaction {
        transaction_id: String,
        expected: TransactionStatus,
        update: TransactionUpdate,
    },
    ListTransactions {
        parent_id: String,
        since: DateTime<Utc>,
    },
    GetRetentionPolicy,
    PutRetentionPolicy {
        policy: RetentionPolicy,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorCode {
    NotFound,
    Conflict,
    Rejected,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub code: WireErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AuthorityResponse {
    Principal(Option<Principal>),
    Transaction(Option<Transaction>),
    Transactions(Vec<Transaction>),
    RetentionPolicy(RetentionPolicy),
    Error(WireError),
}

impl From<AuthorityError> for WireError {
    fn from(e: AuthorityError) -> Self {
        let (code, transaction_id, status) = match &e {
            AuthorityError::NotFound(_) => (WireErrorCode::NotFound, None, None),
            AuthorityError::Conflict {
                transaction_id,
                status,
            } => (
                WireErrorCode::Conflict,
                Some(transaction_id.clone()),
                Some(*status),
            ),
            AuthorityError::Rejected(_) => (WireErrorCode::Rejected, None, None),
            _ => (WireErrorCode::Internal, None, None),
        };
        let message = match e {
            AuthorityError::NotFound(m) | AuthorityError::Rejected(m) => m,
            other => other.to_string(),
        };
        WireError {
            code,
            message,
            transaction_id,
            status,
        }
    }
}

impl From<WireError> for AuthorityError {
    fn from(e: WireError) -> Self {
        match (e.code, e.transaction_id, e.status) {
            (WireErrorCode::NotFound, _, _) => AuthorityError::NotFound(e.message),
            (WireErrorCode::Conflict, Some(transaction_id), Some(status)) => {
                AuthorityError::Conflict {
                    transaction_id,
                    status,
                }
            }
            (WireErrorCode::Rejected, _, _) => AuthorityError::Rejected(e.message),
            _ => AuthorityError::Internal(e.message),
        }
    }
}

fn unexpected(kind: &str) -> AuthorityError {
    AuthorityError::Internal(format!("unexpected authority response, wanted {kind}"))
}

impl AuthorityResponse {
    pub fn into_optional_principal(self) -> AuthorityResult<Option<Principal>> {
        match self {
            AuthorityResponse::Principal(p) => Ok(p),
            AuthorityResponse::Error(e) => Err(e.into()),
            _ => Err(unexpected("principal")),
        }
    }

    pub fn into_principal(self) -> AuthorityResult<Principal> {
        self.into_optional_principal()?
            .ok_or_else(|| unexpected("principal"))
    }

    pub fn into_optional_transaction(self) -> AuthorityResult<Option<Transaction>> {
        match self {
            AuthorityResponse::Transaction(t) => Ok(t),
            AuthorityResponse::Error(e) => Err(e.into()),
            _ => Err(unexpected("transaction")),
        }
    }

    pub fn into_transaction(self) -> AuthorityResult<Transaction> {
        self.into_optional_transaction()?
            .ok_or_else(|| unexpected("transaction"))
    }

    pub fn into_transactions(self) -> AuthorityResult<Vec<Transaction>> {
        match self {
            AuthorityResponse::Transactions(t) => Ok(t),
            AuthorityResponse::Error(e) => Err(e.into()),
            _ => Err(unexpected("transactions")),
        }
    }

    pub fn into_retention_policy(self) -> AuthorityResult<RetentionPolicy> {
        match self {
            AuthorityResponse::RetentionPolicy(p) => Ok(p),
            AuthorityResponse::Error(e) => Err(e.into()),
            _ => Err(unexpected("retention policy")),
        }
    }
}

/// Serve one request against a backend. This is the server half of the
/// protocol `HttpAuthority` speaks.
pub async fn dispatch(
    backend: &dyn AuthorityBackend,
    request: AuthorityRequest,
) -> AuthorityResponse {
    let result = match request {
        AuthorityRequest::CreatePrincipal { principal } => backend
            .create_principal(principal)
            .await
            .map(|p| AuthorityResponse::Principal(Some(p))),
        AuthorityRequest::GetPrincipal { principal_id } => backend
            .get_principal(&principal_id)
            .await
            .map(AuthorityResponse::Principal),
        AuthorityRequest::SetPermission {
            principal_id,
            permission,
            granted,
        } => backend
            .set_permission(&principal_id, permission, granted)
            .await
            .map(|p| AuthorityResponse::Principal(Some(p))),
        AuthorityRequest::DeactivatePrincipal { principal_id } => backend
            .deactivate_principal(&principal_id)
            .await
            .map(|p| AuthorityResponse::Principal(Some(p))),
        AuthorityRequest::TouchLogin { principal_id, at } => backend
            .touch_login(&principal_id, at)
            .await
            .map(|p| AuthorityResponse::Principal(Some(p))),
        AuthorityRequest::SubmitTransaction { transaction } => backend
            .submit_transaction(transaction)
            .await
            .map(|t| AuthorityResponse::Transaction(Some(t))),
        AuthorityRequest::GetTransaction { transaction_id } => backend
            .get_transaction(&transaction_id)
            .await
            .map(AuthorityResponse::Transaction),
        AuthorityRequest::TransitionTransaction {
            transaction_id,
            expected,
            update,
        } => backend
            .transition_transaction(&transaction_id, expected, update)
            .await
            .map(|t| AuthorityResponse::Transaction(Some(t))),
        AuthorityRequest::ListTransactions { parent_id, since } => backend
            .list_transactions(&parent_id, since)
            .await
            .map(AuthorityResponse::Transactions),
        AuthorityRequest::GetRetentionPolicy => backend
            .retention_policy()
            .await
            .map(AuthorityResponse::RetentionPolicy),
        AuthorityRequest::PutRetentionPolicy { policy } => backend
            .put_retention_policy(policy)
            .await
            .map(AuthorityResponse::RetentionPolicy),
    };

    result.unwrap_or_else(|e| AuthorityResponse::Error(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_tags() {
        let json = serde_json::to_value(AuthorityRequest::GetPrincipal {
            principal_id: "p1".into(),
        })
        .unwrap();
        assert_eq!(json["op"], "get_principal");
        assert_eq!(json["principal_id"], "p1");

        let unit = serde_json::to_value(AuthorityRequest::GetRetentionPolicy).unwrap();
        assert_eq!(unit["op"], "get_retention_policy");
    }

    #[test]
    fn unknown_op_is_rejected_at_the_edge() {
        let parsed: Result<AuthorityRequest, _> =
            serde_json::from_str(r#"{"op":"drop_tables"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn conflict_survives_the_wire() {
        let wire: WireError = AuthorityError::Conflict {
            transaction_id: "tx-1".into(),
            status: TransactionStatus::Rejected,
        }
        .into();
        let json = serde_json::to_string(&AuthorityResponse::Error(wire)).unwrap();
        let back: AuthorityResponse = serde_json::from_str(&json).unwrap();

        match back.into_transaction() {
            Err(AuthorityError::Conflict {
                transaction_id,
                status,
            }) => {
                assert_eq!(transaction_id, "tx-1");
                assert_eq!(status, TransactionStatus::Rejected);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn wrong_kind_is_an_error() {
        let response = AuthorityResponse::Transactions(Vec::new());
        assert!(matches!(
            response.into_principal(),
            Err(AuthorityError::Internal(_))
        ));
    }

    #[test]
    fn missing_principal_round_trips_as_none() {
        let json = serde_json::to_string(&AuthorityResponse::Principal(None)).unwrap();
        let back: AuthorityResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_optional_principal().unwrap(), None);
    }
}
