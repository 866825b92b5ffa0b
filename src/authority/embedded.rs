// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded authority backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `principals`: principal_id → serialized Principal
//! - `transactions`: transaction_id → serialized Transaction
//! - `parent_tx_index`: composite key (parent_id|!created_ms|tx_id) → tx_id
//! - `policy`: key → serialized policy document

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};

use super::{AuthorityBackend, AuthorityError, AuthorityResult};
use crate::access::{Permission, Principal};
use crate::finance::{Transaction, TransactionStatus, TransactionUpdate};
use crate::privacy::RetentionPolicy;

// =============================================================================
// Table Definitions
// =============================================================================

const PRINCIPALS: TableDefinition<&str, &[u8]> = TableDefinition::new("principals");

const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Key format: `parent_id | inverted_millis_be | tx_id` for newest-first scans.
const PARENT_TX_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("parent_tx_index");

const POLICY: TableDefinition<&str, &[u8]> = TableDefinition::new("policy");

const RETENTION_POLICY_KEY: &str = "retention_policy";

// =============================================================================
// Index Key Helpers
// =============================================================================

fn make_index_key(parent_id: &str, created_at: DateTime<Utc>, tx_id: &str) -> Vec<u8> {
    let millis = created_at.timestamp_millis();
    let mut key = Vec::with_capacity(parent_id.len() + 1 + 8 + 1 + tx_id.len());
    key.extend_from_slice(parent_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!millis as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(tx_id.as_bytes());
    key
}

fn make_prefix(parent_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(parent_id.len() + 1);
    prefix.extend_from_slice(parent_id.as_bytes());
    prefix.push(b'|');
    prefix
}

fn make_prefix_end(parent_id: &str) -> Vec<u8> {
    let mut end = make_prefix(parent_id);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> AuthorityResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn encode<T: Serialize>(value: &T) -> AuthorityResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

// =============================================================================
// EmbeddedAuthority
// =============================================================================

pub struct EmbeddedAuthority {
    db: Database,
}

impl EmbeddedAuthority {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> AuthorityResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AuthorityError::Internal(e.to_string()))?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRINCIPALS)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(PARENT_TX_INDEX)?;
            let _ = write_txn.open_table(POLICY)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Read-modify-write of one principal inside a single write transaction.
    fn update_principal(
        &self,
        principal_id: &str,
        mutate: impl FnOnce(&mut Principal),
    ) -> AuthorityResult<Principal> {
        let write_txn = self.db.begin_write()?;
        let principal = {
            let mut table = write_txn.open_table(PRINCIPALS)?;
            let existing = {
                let value = table
                    .get(principal_id)?
                    .ok_or_else(|| AuthorityError::NotFound(format!("principal {principal_id}")))?;
                value.value().to_vec()
            };

            let mut principal: Principal = decode(&existing)?;
            mutate(&mut principal);
            table.insert(principal_id, encode(&principal)?.as_slice())?;
            principal
        };
        write_txn.commit()?;
        Ok(principal)
    }
}

#[async_trait]
impl AuthorityBackend for EmbeddedAuthority {
    async fn create_principal(&self, principal: Principal) -> AuthorityResult<Principal> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PRINCIPALS)?;
            if table.get(principal.id.as_str())?.is_some() {
                return Err(AuthorityError::Rejected(format!(
                    "principal {} already exists",
                    principal.id
                )));
            }
            table.insert(principal.id.as_str(), encode(&principal)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(principal)
    }

    async fn get_principal(&self, principal_id: &str) -> AuthorityResult<Option<Principal>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINCIPALS)?;
        match table.get(principal_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    async fn set_permission(
        &self,
        principal_id: &str,
        permission: Permission,
        granted: bool,
    ) -> AuthorityResult<Principal> {
        self.update_principal(principal_id, |p| {
            if granted {
                p.permissions.insert(permission);
            } else {
                p.permissions.remove(&permission);
            }
        })
    }

    async fn deactivate_principal(&self, principal_id: &str) -> AuthorityResult<Principal> {
        self.update_principal(principal_id, |p| p.is_active = false)
    }

    async fn touch_login(
        &self,
        principal_id: &str,
        at: DateTime<Utc>,
    ) -> AuthorityResult<Principal> {
        self.update_principal(principal_id, |p| p.last_login = Some(at))
    }

    async fn submit_transaction(&self, transaction: Transaction) -> AuthorityResult<Transaction> {
        let json = encode(&transaction)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
            if tx_table.get(transaction.id.as_str())?.is_some() {
                return Err(AuthorityError::Rejected(format!(
                    "transaction {} already exists",
                    transaction.id
                )));
            }
            tx_table.insert(transaction.id.as_str(), json.as_slice())?;

            let mut idx_table = write_txn.open_table(PARENT_TX_INDEX)?;
            let key = make_index_key(
                &transaction.parent_id,
                transaction.created_at,
                &transaction.id,
            );
            idx_table.insert(key.as_slice(), transaction.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(transaction)
    }

    async fn get_transaction(&self, transaction_id: &str) -> AuthorityResult<Option<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS)?;
        match table.get(transaction_id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    async fn transition_transaction(
        &self,
        transaction_id: &str,
        expected: TransactionStatus,
        update: TransactionUpdate,
    ) -> AuthorityResult<Transaction> {
        if !update.status.is_terminal() {
            return Err(AuthorityError::Rejected(
                "transitions must end in a terminal status".to_string(),
            ));
        }

        let write_txn = self.db.begin_write()?;
        let transaction = {
            let mut table = write_txn.open_table(TRANSACTIONS)?;
            let existing = {
                let value = table.get(transaction_id)?.ok_or_else(|| {
                    AuthorityError::NotFound(format!("transaction {transaction_id}"))
                })?;
                value.value().to_vec()
            };

            let mut transaction: Transaction = decode(&existing)?;
            if transaction.status != expected {
                return Err(AuthorityError::Conflict {
                    transaction_id: transaction_id.to_string(),
                    status: transaction.status,
                });
            }
            transaction.apply(update);
            table.insert(transaction_id, encode(&transaction)?.as_slice())?;
            transaction
        };
        write_txn.commit()?;
        Ok(transaction)
    }

    async fn list_transactions(
        &self,
        parent_id: &str,
        since: DateTime<Utc>,
    ) -> AuthorityResult<Vec<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(PARENT_TX_INDEX)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let prefix = make_prefix(parent_id);
        let prefix_end = make_prefix_end(parent_id);

        let mut results = Vec::new();
        for entry in idx_table.range(prefix.as_slice()..prefix_end.as_slice())? {
            let entry = entry?;
            let tx_id = entry.1.value().to_string();
            if let Some(value) = tx_table.get(tx_id.as_str())? {
                let transaction: Transaction = decode(value.value())?;
                // Newest first: everything after this is older still.
                if transaction.created_at < since {
                    break;
                }
                results.push(transaction);
            }
        }
        Ok(results)
    }

    async fn retention_policy(&self) -> AuthorityResult<RetentionPolicy> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(POLICY)?;
        match table.get(RETENTION_POLICY_KEY)? {
            Some(value) => decode(value.value()),
            None => Ok(RetentionPolicy::default()),
        }
    }

    async fn put_retention_policy(
        &self,
        policy: RetentionPolicy,
    ) -> AuthorityResult<RetentionPolicy> {
        policy.validate().map_err(AuthorityError::Rejected)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(POLICY)?;
            table.insert(RETENTION_POLICY_KEY, encode(&policy)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(policy)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::access::Role;
    use crate::finance::RiskLevel;
    use crate::vault::EncryptedBlob;
    use chrono::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, EmbeddedAuthority) {
        let temp = TempDir::new().unwrap();
        let db = EmbeddedAuthority::open(&temp.path().join("authority.redb")).unwrap();
        (temp, db)
    }

    pub(crate) fn sample_transaction(
        id: &str,
        parent_id: &str,
        created_at: DateTime<Utc>,
    ) -> Transaction {
        Transaction {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            child_id: "child-1".to_string(),
            requested_by: "child-1".to_string(),
            amount: 100,
            payout_key: EncryptedBlob {
                ciphertext: vec![1, 2, 3],
                nonce: vec![0; 12],
                auth_tag: vec![0; 16],
            },
            payout_key_hint: "****4321".to_string(),
            description: "weekly chores".to_string(),
            status: TransactionStatus::Pending,
            risk_level: RiskLevel::Low,
            rejection_reason: None,
            created_at,
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn principal_crud() {
        let (_temp, db) = setup();
        let principal = Principal::new("parent-1", Role::Parent, None, None);
        db.create_principal(principal.clone()).await.unwrap();

        let fetched = db.get_principal("parent-1").await.unwrap().unwrap();
        assert_eq!(fetched, principal);
        assert!(db.get_principal("nobody").await.unwrap().is_none());

        let dup = db.create_principal(principal).await;
        assert!(matches!(dup, Err(AuthorityError::Rejected(_))));
    }

    #[tokio::test]
    async fn permission_mutation_is_idempotent() {
        let (_temp, db) = setup();
        db.create_principal(Principal::new("p1", Role::Moderator, None, None))
            .await
            .unwrap();

        let once = db
            .set_permission("p1", Permission::ManageUsers, true)
            .await
            .unwrap();
        let twice = db
            .set_permission("p1", Permission::ManageUsers, true)
            .await
            .unwrap();
        assert_eq!(once.permissions, twice.permissions);

        let revoked = db
            .set_permission("p1", Permission::ManageUsers, false)
            .await
            .unwrap();
        let again = db
            .set_permission("p1", Permission::ManageUsers, false)
            .await
            .unwrap();
        assert!(!again.permissions.contains(&Permission::ManageUsers));
        assert_eq!(revoked.permissions, again.permissions);
    }

    #[tokio::test]
    async fn missing_principal_is_not_found() {
        let (_temp, db) = setup();
        let result = db.deactivate_principal("ghost").await;
        assert!(matches!(result, Err(AuthorityError::NotFound(_))));
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let (_temp, db) = setup();
        db.submit_transaction(sample_transaction("tx-1", "p1", Utc::now()))
            .await
            .unwrap();

        let approved = db
            .transition_transaction(
                "tx-1",
                TransactionStatus::Pending,
                TransactionUpdate::terminal(TransactionStatus::Approved, None),
            )
            .await
            .unwrap();
        assert_eq!(approved.status, TransactionStatus::Approved);
        assert!(approved.processed_at.is_some());

        let second = db
            .transition_transaction(
                "tx-1",
                TransactionStatus::Pending,
                TransactionUpdate::terminal(TransactionStatus::Rejected, Some("late".into())),
            )
            .await;
        match second {
            Err(AuthorityError::Conflict { status, .. }) => {
                assert_eq!(status, TransactionStatus::Approved)
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        let stored = db.get_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Approved);
        assert!(stored.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_bounded() {
        let (_temp, db) = setup();
        let now = Utc::now();
        db.submit_transaction(sample_transaction("old", "p1", now - Duration::days(10)))
            .await
            .unwrap();
        db.submit_transaction(sample_transaction("mid", "p1", now - Duration::days(1)))
            .await
            .unwrap();
        db.submit_transaction(sample_transaction("new", "p1", now))
            .await
            .unwrap();
        db.submit_transaction(sample_transaction("other", "p10", now))
            .await
            .unwrap();

        let recent = db
            .list_transactions("p1", now - Duration::days(2))
            .await
            .unwrap();
        let ids: Vec<&str> = recent.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn retention_policy_defaults_and_updates() {
        let (_temp, db) = setup();
        assert_eq!(db.retention_policy().await.unwrap(), RetentionPolicy::default());

        let policy = RetentionPolicy {
            general_logs_days: 7,
            ..Default::default()
        };
        db.put_retention_policy(policy.clone()).await.unwrap();
        assert_eq!(db.retention_policy().await.unwrap(), policy);

        let invalid = RetentionPolicy {
            login_logs_days: 0,
            ..Default::default()
        };
        assert!(matches!(
            db.put_retention_policy(invalid).await,
            Err(AuthorityError::Rejected(_))
        ));
    }
}
