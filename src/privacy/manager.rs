// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Preferences, data-access auditing, retention and subject rights.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{DataAccessLog, DataLogRing, PrivacySettings, RetentionPolicy};
use crate::access::{
    AccessAction, AccessControlEngine, AccessLogEntry, Permission, Principal,
};
use crate::error::{TrustError, TrustResult};
use crate::locks::KeyedLocks;
use crate::vault::paths::{decode_id, encode_id};
use crate::vault::{BackupHandle, RecordKey, SealedStore};

const DATA_LOG_NAMESPACE: &str = "logs";
const EXPORT_PREFIX: &str = "export.";

/// Everything held about one principal, as written to an export artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserDataExport {
    pub principal_id: String,
    pub exported_at: DateTime<Utc>,
    pub principal: Principal,
    pub settings: PrivacySettings,
    pub data_logs: Vec<DataAccessLog>,
    pub access_log: Vec<AccessLogEntry>,
    pub retention_policy: RetentionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ExportReceipt {
    /// Opaque handle for `read_export`.
    pub handle: String,
    pub principal_id: String,
    pub exported_at: DateTime<Utc>,
    pub data_log_entries: usize,
    pub access_log_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErasureReport {
    pub principal_id: String,
    pub records_erased: usize,
    pub exports_erased: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CleanupReport {
    pub access_log_removed: usize,
    pub data_log_removed: usize,
    pub principals_scanned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

fn export_prefix(principal_id: &str) -> String {
    format!("{EXPORT_PREFIX}{}.", encode_id(principal_id))
}

/// Subject of an export handle, if it is one.
fn export_subject(handle: &BackupHandle) -> Option<String> {
    let rest = handle.as_str().strip_prefix(EXPORT_PREFIX)?;
    let (encoded, _) = rest.split_once('.')?;
    decode_id(encoded)
}

pub struct PrivacyRetentionManager {
    engine: Arc<AccessControlEngine>,
    store: SealedStore,
    locks: KeyedLocks,
    last_policy: Mutex<Option<RetentionPolicy>>,
}

impl PrivacyRetentionManager {
    pub fn new(engine: Arc<AccessControlEngine>, store: SealedStore) -> Self {
        Self {
            engine,
            store,
            locks: KeyedLocks::new(),
            last_policy: Mutex::new(None),
        }
    }

    /// Self, a guardian of the subject, or a holder of `ManageUsers`.
    /// Guardian writes additionally need `ManageConsent`.
    async fn authorize_subject(
        &self,
        actor_id: &str,
        principal_id: &str,
        access: Access,
        action: AccessAction,
    ) -> TrustResult<()> {
        let resource = format!("principal:{principal_id}");
        let (own, child) = match access {
            Access::Read => (Permission::ReadOwnData, Permission::ReadChildData),
            Access::Write => (Permission::WriteOwnData, Permission::WriteChildData),
        };

        if actor_id == principal_id {
            self.engine
                .require(actor_id, own, Some(principal_id), action, &resource)
                .await?;
            return Ok(());
        }

        let guardian = self
            .engine
            .check_permission(actor_id, child, Some(principal_id))
            .await;
        if guardian
            && (access == Access::Read
                || self
                    .engine
                    .check_permission(actor_id, Permission::ManageConsent, None)
                    .await)
        {
            return Ok(());
        }

        self.engine
            .require(actor_id, Permission::ManageUsers, None, action, &resource)
            .await?;
        Ok(())
    }

    /// Self (when their settings allow it) or a holder of `ManageUsers`.
    async fn authorize_subject_rights(
        &self,
        actor_id: &str,
        principal_id: &str,
        action: AccessAction,
    ) -> TrustResult<()> {
        let resource = format!("principal:{principal_id}");
        if actor_id == principal_id
            && self
                .engine
                .check_permission(actor_id, Permission::ReadOwnData, Some(principal_id))
                .await
        {
            let settings = self.stored_or_default(principal_id).await?;
            let allowed = match action {
                AccessAction::DataDeletion => settings.allow_data_deletion,
                _ => settings.allow_data_export,
            };
            if allowed {
                return Ok(());
            }
        }
        self.engine
            .require(actor_id, Permission::ManageUsers, None, action, &resource)
            .await?;
        Ok(())
    }

    async fn stored_or_default(&self, principal_id: &str) -> TrustResult<PrivacySettings> {
        if let Some(settings) = self
            .store
            .get::<PrivacySettings>(&RecordKey::Settings(principal_id.to_string()))?
        {
            return Ok(settings);
        }
        let principal = self.engine.principal(principal_id).await?;
        Ok(PrivacySettings::defaults_for(principal.role))
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Stored settings, or the role's defaults when none were saved yet.
    pub async fn get_settings(
        &self,
        actor_id: &str,
        principal_id: &str,
    ) -> TrustResult<PrivacySettings> {
        self.authorize_subject(actor_id, principal_id, Access::Read, AccessAction::SettingsRead)
            .await?;
        self.stored_or_default(principal_id).await
    }

    pub async fn set_settings(
        &self,
        actor_id: &str,
        principal_id: &str,
        mut settings: PrivacySettings,
    ) -> TrustResult<PrivacySettings> {
        self.authorize_subject(
            actor_id,
            principal_id,
            Access::Write,
            AccessAction::SettingsUpdate,
        )
        .await?;

        let principal = self.engine.principal(principal_id).await?;
        settings
            .validate_for(principal.role)
            .map_err(TrustError::InvalidInput)?;
        settings.updated_at = Some(Utc::now());

        let _guard = self.locks.lock(principal_id).await;
        self.store
            .put(&RecordKey::Settings(principal_id.to_string()), &settings)?;

        info!(actor_id = %actor_id, principal_id = %principal_id, "privacy settings updated");
        self.engine.record_access(AccessLogEntry::action(
            actor_id,
            AccessAction::SettingsUpdate,
            format!("settings:{principal_id}"),
        ));
        Ok(settings)
    }

    // =========================================================================
    // Data access log
    // =========================================================================

    /// Append to the subject's bounded data-access log.
    pub async fn log_access(&self, entry: DataAccessLog) -> TrustResult<()> {
        let key = RecordKey::DataLogs(entry.principal_id.clone());
        let _guard = self.locks.lock(&entry.principal_id).await;
        let mut ring: DataLogRing = self.store.get(&key)?.unwrap_or_default();
        ring.push(entry);
        self.store.put(&key, &ring)?;
        Ok(())
    }

    pub async fn data_logs(
        &self,
        actor_id: &str,
        principal_id: &str,
    ) -> TrustResult<Vec<DataAccessLog>> {
        self.authorize_subject(actor_id, principal_id, Access::Read, AccessAction::ViewLogs)
            .await?;
        let ring: DataLogRing = self
            .store
            .get(&RecordKey::DataLogs(principal_id.to_string()))?
            .unwrap_or_default();
        Ok(ring.into_vec())
    }

    // =========================================================================
    // Subject rights
    // =========================================================================

    /// Write one sealed export artifact. Either the whole artifact is
    /// written or nothing is.
    pub async fn export_user_data(
        &self,
        actor_id: &str,
        principal_id: &str,
    ) -> TrustResult<ExportReceipt> {
        self.authorize_subject_rights(actor_id, principal_id, AccessAction::DataExport)
            .await?;

        let principal = self.engine.principal(principal_id).await?;
        let retention_policy = self.retention_policy().await?;

        let export = {
            let _guard = self.locks.lock(principal_id).await;
            let settings = self
                .store
                .get::<PrivacySettings>(&RecordKey::Settings(principal_id.to_string()))?
                .unwrap_or_else(|| PrivacySettings::defaults_for(principal.role));
            let data_logs: DataLogRing = self
                .store
                .get(&RecordKey::DataLogs(principal_id.to_string()))?
                .unwrap_or_default();

            UserDataExport {
                principal_id: principal_id.to_string(),
                exported_at: Utc::now(),
                principal,
                settings,
                data_logs: data_logs.into_vec(),
                access_log: self.engine.access_log().entries_for(principal_id),
                retention_policy,
            }
        };

        let name = format!(
            "{}{}",
            export_prefix(principal_id),
            export.exported_at.timestamp_millis()
        );
        let bytes = serde_json::to_vec(&export)
            .map_err(|e| TrustError::Storage(format!("failed to encode export: {e}")))?;
        let handle = self.store.vault().backup(&bytes, &name)?;

        info!(actor_id = %actor_id, principal_id = %principal_id, handle = %handle, "user data exported");
        self.engine.record_access(AccessLogEntry::action(
            actor_id,
            AccessAction::DataExport,
            format!("principal:{principal_id}"),
        ));

        Ok(ExportReceipt {
            handle: handle.to_string(),
            principal_id: principal_id.to_string(),
            exported_at: export.exported_at,
            data_log_entries: export.data_logs.len(),
            access_log_entries: export.access_log.len(),
        })
    }

    /// Open an export artifact. Same authorization as creating it.
    pub async fn read_export(&self, actor_id: &str, handle: &str) -> TrustResult<UserDataExport> {
        let handle = BackupHandle::parse(handle)?;
        let subject = export_subject(&handle)
            .ok_or_else(|| TrustError::NotFound(format!("export {handle}")))?;
        self.authorize_subject_rights(actor_id, &subject, AccessAction::DataExport)
            .await?;

        let bytes = self.store.vault().restore(&handle)?;
        serde_json::from_slice(&bytes)
            .map_err(|_| TrustError::Integrity(format!("export {handle} is malformed")))
    }

    /// Right to erasure. The `DATA_DELETION` entry is written before
    /// anything is removed; if it cannot be written nothing is removed.
    pub async fn erase_user_data(
        &self,
        actor_id: &str,
        principal_id: &str,
    ) -> TrustResult<ErasureReport> {
        self.authorize_subject_rights(actor_id, principal_id, AccessAction::DataDeletion)
            .await?;

        let _guard = self.locks.lock(principal_id).await;
        self.engine.try_record_access(AccessLogEntry::action(
            actor_id,
            AccessAction::DataDeletion,
            format!("principal:{principal_id}"),
        ))?;

        let records_erased = self.store.erase_principal(principal_id)?;

        let vault = self.store.vault();
        let exports = vault.list_backups(&export_prefix(principal_id))?;
        for handle in &exports {
            vault.delete_backup(handle)?;
        }

        info!(
            actor_id = %actor_id,
            principal_id = %principal_id,
            records_erased,
            exports_erased = exports.len(),
            "user data erased"
        );
        Ok(ErasureReport {
            principal_id: principal_id.to_string(),
            records_erased,
            exports_erased: exports.len(),
        })
    }

    // =========================================================================
    // Retention
    // =========================================================================

    /// Authoritative policy. Falls back to the last policy read when the
    /// authority is unreachable; fails if none was ever read.
    pub async fn retention_policy(&self) -> TrustResult<RetentionPolicy> {
        match self.engine.authority().retention_policy().await {
            Ok(policy) => {
                if let Ok(mut last) = self.last_policy.lock() {
                    *last = Some(policy.clone());
                }
                Ok(policy)
            }
            Err(e) => {
                let e = TrustError::from(e);
                let last = self.last_policy.lock().ok().and_then(|p| p.clone());
                match last {
                    Some(policy) => {
                        warn!(error = %e, "authority unavailable, using last known retention policy");
                        Ok(policy)
                    }
                    None => Err(e),
                }
            }
        }
    }

    pub async fn set_retention_policy(
        &self,
        actor_id: &str,
        policy: RetentionPolicy,
    ) -> TrustResult<RetentionPolicy> {
        self.engine
            .require(
                actor_id,
                Permission::ManageSystem,
                None,
                AccessAction::RetentionPolicyUpdate,
                "retentionPolicy",
            )
            .await?;
        policy.validate().map_err(TrustError::InvalidInput)?;

        let stored = self
            .engine
            .authority()
            .put_retention_policy(policy)
            .await?;
        if let Ok(mut last) = self.last_policy.lock() {
            *last = Some(stored.clone());
        }

        info!(actor_id = %actor_id, "retention policy updated");
        self.engine.record_access(AccessLogEntry::action(
            actor_id,
            AccessAction::RetentionPolicyUpdate,
            "retentionPolicy",
        ));
        Ok(stored)
    }

    /// Drop every log entry past its category's window. Idempotent.
    pub async fn cleanup_expired_data(&self) -> TrustResult<CleanupReport> {
        self.cleanup_expired_data_at(Utc::now()).await
    }

    pub async fn cleanup_expired_data_at(&self, now: DateTime<Utc>) -> TrustResult<CleanupReport> {
        let policy = self.retention_policy().await?;
        let mut report = CleanupReport {
            access_log_removed: self.engine.access_log().expire(&policy, now)?,
            ..Default::default()
        };

        for principal_id in self.store.list_ids(DATA_LOG_NAMESPACE)? {
            let key = RecordKey::DataLogs(principal_id.clone());
            let _guard = self.locks.lock(&principal_id).await;
            let Some(mut ring) = self.store.get::<DataLogRing>(&key)? else {
                continue;
            };
            report.principals_scanned += 1;

            let removed = ring.expire(&policy, now);
            if removed == 0 {
                continue;
            }
            if ring.is_empty() {
                self.store.remove(&key)?;
            } else {
                self.store.put(&key, &ring)?;
            }
            report.data_log_removed += removed;
        }
        self.locks.prune();

        info!(
            access_log_removed = report.access_log_removed,
            data_log_removed = report.data_log_removed,
            principals_scanned = report.principals_scanned,
            "retention cleanup finished"
        );
        Ok(report)
    }

    /// Manual cleanup run by a holder of `ManageSystem`.
    pub async fn cleanup_as(&self, actor_id: &str) -> TrustResult<CleanupReport> {
        self.engine
            .require(
                actor_id,
                Permission::ManageSystem,
                None,
                AccessAction::RetentionCleanup,
                "retention",
            )
            .await?;
        let report = self.cleanup_expired_data().await?;
        self.engine.record_access(
            AccessLogEntry::action(actor_id, AccessAction::RetentionCleanup, "retention")
                .with_details(format!(
                    "{} access, {} data entries removed",
                    report.access_log_removed, report.data_log_removed
                )),
        );
        Ok(report)
    }
}
