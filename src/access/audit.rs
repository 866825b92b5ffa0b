// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Append-only access log.
//!
//! Every sensitive operation, allowed or denied, lands here. Each entry is
//! sealed into its own record, named by UTC day and log id. Nothing mutates
//! or removes an entry except retention expiry.

use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::privacy::{LogCategory, RetentionPolicy};
use crate::vault::{RecordKey, SealedStore, VaultResult};

/// Actions recorded by the core itself. External callers may record any
/// action string through `AccessLogEntry::new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessAction {
    // Principal events
    CreatePrincipal,
    GrantPermission,
    RevokePermission,
    Deactivate,
    Login,
    ViewLogs,

    // Privacy events
    SettingsRead,
    SettingsUpdate,
    DataExport,
    DataDeletion,
    RetentionCleanup,
    RetentionPolicyUpdate,

    // Second factor events
    TwoFactorEnroll,
    TwoFactorVerify,
    BackupCodeVerify,
    BackupCodesRegenerate,
    TwoFactorDisable,

    // Transaction events
    TransactionCreate,
    TransactionApprove,
    TransactionReject,
    TransactionCancel,
    TransactionView,
    TransactionHistory,
    PayoutKeyReveal,
    LimitsView,
    LimitsUpdate,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::CreatePrincipal => "CREATE_PRINCIPAL",
            AccessAction::GrantPermission => "GRANT_PERMISSION",
            AccessAction::RevokePermission => "REVOKE_PERMISSION",
            AccessAction::Deactivate => "DEACTIVATE",
            AccessAction::Login => "LOGIN",
            AccessAction::ViewLogs => "VIEW_LOGS",
            AccessAction::SettingsRead => "SETTINGS_READ",
            AccessAction::SettingsUpdate => "SETTINGS_UPDATE",
            AccessAction::DataExport => "DATA_EXPORT",
            AccessAction::DataDeletion => "DATA_DELETION",
            AccessAction::RetentionCleanup => "RETENTION_CLEANUP",
            AccessAction::RetentionPolicyUpdate => "RETENTION_POLICY_UPDATE",
            AccessAction::TwoFactorEnroll => "TWO_FACTOR_ENROLL",
            AccessAction::TwoFactorVerify => "TWO_FACTOR_VERIFY",
            AccessAction::BackupCodeVerify => "BACKUP_CODE_VERIFY",
            AccessAction::BackupCodesRegenerate => "BACKUP_CODES_REGENERATE",
            AccessAction::TwoFactorDisable => "TWO_FACTOR_DISABLE",
            AccessAction::TransactionCreate => "TRANSACTION_CREATE",
            AccessAction::TransactionApprove => "TRANSACTION_APPROVE",
            AccessAction::TransactionReject => "TRANSACTION_REJECT",
            AccessAction::TransactionCancel => "TRANSACTION_CANCEL",
            AccessAction::TransactionView => "TRANSACTION_VIEW",
            AccessAction::TransactionHistory => "TRANSACTION_HISTORY",
            AccessAction::PayoutKeyReveal => "PAYOUT_KEY_REVEAL",
            AccessAction::LimitsView => "LIMITS_VIEW",
            AccessAction::LimitsUpdate => "LIMITS_UPDATE",
        }
    }

    pub fn category(&self) -> LogCategory {
        match self {
            AccessAction::Login => LogCategory::Login,
            AccessAction::TransactionCreate
            | AccessAction::TransactionApprove
            | AccessAction::TransactionReject
            | AccessAction::TransactionCancel
            | AccessAction::TransactionView
            | AccessAction::TransactionHistory
            | AccessAction::PayoutKeyReveal
            | AccessAction::LimitsView
            | AccessAction::LimitsUpdate => LogCategory::Financial,
            _ => LogCategory::General,
        }
    }
}

/// One access log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccessLogEntry {
    pub log_id: String,
    pub principal_id: String,
    pub action: String,
    pub resource: String,
    pub category: LogCategory,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub details: Option<String>,
}

impl AccessLogEntry {
    /// Entry for an arbitrary action, category `GENERAL`.
    pub fn new(
        principal_id: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            log_id: uuid::Uuid::new_v4().to_string(),
            principal_id: principal_id.into(),
            action: action.into(),
            resource: resource.into(),
            category: LogCategory::General,
            timestamp: Utc::now(),
            success: true,
            details: None,
        }
    }

    /// Entry for a core action, categorised by the action.
    pub fn action(
        principal_id: impl Into<String>,
        action: AccessAction,
        resource: impl Into<String>,
    ) -> Self {
        Self::new(principal_id, action.as_str(), resource).with_category(action.category())
    }

    pub fn with_category(mut self, category: LogCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Mark as failed (a denial or an error).
    pub fn failed(mut self, details: impl Into<String>) -> Self {
        self.success = false;
        self.details = Some(details.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn record_key(&self) -> RecordKey {
        RecordKey::AccessLog(format!("{}.{}", day(self.timestamp), self.log_id))
    }
}

const ENTRY_NAMESPACE: &str = "accessLog";

fn day(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d").to_string()
}

/// Sealed access log with an in-memory index.
///
/// Each entry is its own record (`accessLog:{YYYY-MM-DD}.{log_id}`), so an
/// append writes one small file and never rewrites earlier entries. The
/// index lock is never held across disk I/O.
pub struct AccessLog {
    store: SealedStore,
    entries: RwLock<Vec<AccessLogEntry>>,
}

impl AccessLog {
    /// Load every persisted entry. An entry that fails authentication fails
    /// the load.
    pub fn load(store: SealedStore) -> VaultResult<Self> {
        let mut entries = Vec::new();
        for id in store.list_ids(ENTRY_NAMESPACE)? {
            let entry: Option<AccessLogEntry> = store.get(&RecordKey::AccessLog(id))?;
            entries.extend(entry);
        }
        entries.sort_by_key(|e| e.timestamp);

        Ok(Self {
            store,
            entries: RwLock::new(entries),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<AccessLogEntry>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<AccessLogEntry>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Append one entry. The entry is visible only once it is persisted.
    pub fn append(&self, entry: AccessLogEntry) -> VaultResult<()> {
        self.store.put(&entry.record_key(), &entry)?;

        let mut entries = self.write();
        let pos = entries.partition_point(|e| e.timestamp <= entry.timestamp);
        entries.insert(pos, entry);
        Ok(())
    }

    /// Entries whose subject is `principal_id`, oldest first.
    pub fn entries_for(&self, principal_id: &str) -> Vec<AccessLogEntry> {
        self.read()
            .iter()
            .filter(|e| e.principal_id == principal_id)
            .cloned()
            .collect()
    }

    /// Newest-first view, optionally filtered by principal.
    pub fn query(&self, principal_id: Option<&str>, limit: usize) -> Vec<AccessLogEntry> {
        self.read()
            .iter()
            .rev()
            .filter(|e| principal_id.is_none_or(|id| e.principal_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove entries past their category's retention window. Idempotent for
    /// a fixed `now`.
    ///
    /// Records are erased first and dropped from the index afterwards. If an
    /// erase fails, the entries already erased still leave the index.
    pub fn expire(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> VaultResult<usize> {
        let expired: Vec<(String, RecordKey)> = self
            .read()
            .iter()
            .filter(|e| policy.is_expired(e.category, e.timestamp, now))
            .map(|e| (e.log_id.clone(), e.record_key()))
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut erased = HashSet::with_capacity(expired.len());
        let mut failure = None;
        for (log_id, key) in expired {
            match self.store.remove(&key) {
                Ok(_) => {
                    erased.insert(log_id);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| !erased.contains(&e.log_id));
        let removed = before - entries.len();
        drop(entries);

        match failure {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}
