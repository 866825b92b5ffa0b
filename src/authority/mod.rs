// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authoritative Backend
//!
//! Principals, transactions and the retention policy are owned by an
//! authority outside this core. Every read that gates a sensitive operation
//! goes through [`AuthorityBackend`]; local copies are advisory.
//!
//! ## Backends
//!
//! - [`EmbeddedAuthority`]: redb database under the data directory
//! - [`HttpAuthority`]: remote service speaking the [`wire`] protocol
//!
//! Failed round-trips are reported as [`AuthorityError::Network`] and never
//! retried here. Retrying a financial operation is the caller's decision.

pub mod embedded;
pub mod http;
pub mod wire;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::access::{Permission, Principal};
use crate::finance::{Transaction, TransactionStatus, TransactionUpdate};
use crate::privacy::RetentionPolicy;

pub use embedded::EmbeddedAuthority;
pub use http::HttpAuthority;

#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// Round-trip failed or timed out. Nothing was applied locally.
    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Compare-and-set lost: the transaction is no longer in the expected state.
    #[error("transaction {transaction_id} is {status}")]
    Conflict {
        transaction_id: String,
        status: TransactionStatus,
    },

    /// The authority refused the request as invalid.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("authority failure: {0}")]
    Internal(String),
}

pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// Request/response channel to the authoritative store.
#[async_trait]
pub trait AuthorityBackend: Send + Sync {
    /// Store a new principal. An existing id is `Rejected`.
    async fn create_principal(&self, principal: Principal) -> AuthorityResult<Principal>;

    async fn get_principal(&self, principal_id: &str) -> AuthorityResult<Option<Principal>>;

    /// Add or remove one permission. Idempotent.
    async fn set_permission(
        &self,
        principal_id: &str,
        permission: Permission,
        granted: bool,
    ) -> AuthorityResult<Principal>;

    /// One-way `Active -> Inactive`. Idempotent.
    async fn deactivate_principal(&self, principal_id: &str) -> AuthorityResult<Principal>;

    async fn touch_login(
        &self,
        principal_id: &str,
        at: DateTime<Utc>,
    ) -> AuthorityResult<Principal>;

    /// Persist a new pending transaction. An existing id is `Rejected`.
    async fn submit_transaction(&self, transaction: Transaction) -> AuthorityResult<Transaction>;

    async fn get_transaction(&self, transaction_id: &str) -> AuthorityResult<Option<Transaction>>;

    /// Apply `update` only if the stored status equals `expected`; otherwise
    /// `Conflict` carrying the current status.
    async fn transition_transaction(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        update: TransactionUpdate,
    ) -> AuthorityResult<Transaction>;

    /// Transactions of `parent_id` created at or after `since`, newest first.
    async fn list_transactions(
        &self,
        parent_id: &str,
        since: DateTime<Utc>,
    ) -> AuthorityResult<Vec<Transaction>>;

    async fn retention_policy(&self) -> AuthorityResult<RetentionPolicy>;

    async fn put_retention_policy(
        &self,
        policy: RetentionPolicy,
    ) -> AuthorityResult<RetentionPolicy>;
}
