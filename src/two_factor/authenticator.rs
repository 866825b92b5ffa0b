// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian second-factor enrollment, verification and sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use zeroize::{Zeroize, Zeroizing};

use super::backup_codes::BackupCodeSet;
use super::totp;
use crate::access::{AccessAction, AccessControlEngine, AccessLogEntry};
use crate::error::{TrustError, TrustResult};
use crate::locks::KeyedLocks;
use crate::vault::{RecordKey, SealedStore};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);
const MAX_CONTACT_LEN: usize = 254;

/// Sealed under `totp:{principal}`. The secret is wiped from memory on drop.
#[derive(Clone, Serialize, Deserialize)]
struct TotpCredential {
    principal_id: String,
    secret_base32: String,
    contact: String,
    enabled: bool,
    enrolled_at: DateTime<Utc>,
    /// Last accepted time step; codes at or before it are replays.
    last_used_step: Option<u64>,
}

impl Drop for TotpCredential {
    fn drop(&mut self) {
        self.secret_base32.zeroize();
    }
}

/// Returned once from `enroll`. Nothing here is retrievable afterwards.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Enrollment {
    pub secret: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub remaining_backup_codes: usize,
    pub verified_session: bool,
    pub enrolled_at: Option<DateTime<Utc>>,
}

pub struct TwoFactorAuthenticator {
    engine: Arc<AccessControlEngine>,
    store: SealedStore,
    locks: KeyedLocks,
    sessions: DashMap<String, Instant>,
    session_ttl: Duration,
    issuer: String,
}

impl TwoFactorAuthenticator {
    pub fn new(
        engine: Arc<AccessControlEngine>,
        store: SealedStore,
        issuer: impl Into<String>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            locks: KeyedLocks::new(),
            sessions: DashMap::new(),
            session_ttl,
            issuer: issuer.into(),
        }
    }

    fn audit_ok(&self, principal_id: &str, action: AccessAction) {
        self.engine.record_access(AccessLogEntry::action(
            principal_id,
            action,
            format!("2fa:{principal_id}"),
        ));
    }

    fn audit_failed(&self, principal_id: &str, action: AccessAction, details: &str) {
        self.engine.record_access(
            AccessLogEntry::action(principal_id, action, format!("2fa:{principal_id}"))
                .failed(details),
        );
    }

    fn credential(&self, principal_id: &str) -> TrustResult<Option<TotpCredential>> {
        Ok(self
            .store
            .get(&RecordKey::TotpCredential(principal_id.to_string()))?)
    }

    fn backup_codes(&self, principal_id: &str) -> TrustResult<BackupCodeSet> {
        Ok(self
            .store
            .get(&RecordKey::BackupCodes(principal_id.to_string()))?
            .unwrap_or_default())
    }

    /// Active principal or `Unauthorized`.
    async fn require_active(&self, principal_id: &str, action: AccessAction) -> TrustResult<bool> {
        let principal = self.engine.principal(principal_id).await?;
        if !principal.is_active {
            self.audit_failed(principal_id, action, "inactive principal");
            return Err(TrustError::unauthorized("inactive principal"));
        }
        Ok(principal.role.is_guardian())
    }

    // =========================================================================
    // Enrollment
    // =========================================================================

    /// Generate a fresh secret and ten backup codes for a guardian.
    ///
    /// Replacing an enabled credential needs a verified session.
    pub async fn enroll(&self, principal_id: &str, contact: &str) -> TrustResult<Enrollment> {
        let guardian = self
            .require_active(principal_id, AccessAction::TwoFactorEnroll)
            .await?;
        if !guardian {
            self.audit_failed(principal_id, AccessAction::TwoFactorEnroll, "not a guardian");
            return Err(TrustError::unauthorized(
                "only parents and admins enroll a second factor",
            ));
        }
        let contact = contact.trim();
        if contact.is_empty() || contact.len() > MAX_CONTACT_LEN {
            self.audit_failed(principal_id, AccessAction::TwoFactorEnroll, "invalid contact");
            return Err(TrustError::invalid_input("contact must be 1-254 characters"));
        }

        let _guard = self.locks.lock(principal_id).await;
        if self.credential(principal_id)?.is_some_and(|c| c.enabled)
            && !self.has_verified_session(principal_id)
        {
            self.audit_failed(
                principal_id,
                AccessAction::TwoFactorEnroll,
                "re-enrollment without verified session",
            );
            return Err(TrustError::unauthorized(
                "verified second factor required to replace it",
            ));
        }

        let vault = self.store.vault();
        let mut secret = Zeroizing::new(vec![0u8; totp::SECRET_LEN]);
        vault.fill_random(&mut secret)?;
        let secret_base32 = totp::base32_encode(&secret);
        let provisioning_uri = totp::provisioning_uri(&self.issuer, contact, &secret_base32)
            .ok_or_else(|| TrustError::Storage("failed to build provisioning uri".into()))?;
        let (codes, backup_codes) = BackupCodeSet::generate(vault, principal_id)?;

        let credential = TotpCredential {
            principal_id: principal_id.to_string(),
            secret_base32: secret_base32.clone(),
            contact: contact.to_string(),
            enabled: true,
            enrolled_at: Utc::now(),
            last_used_step: None,
        };
        self.store
            .put(&RecordKey::TotpCredential(principal_id.to_string()), &credential)?;
        self.store
            .put(&RecordKey::BackupCodes(principal_id.to_string()), &codes)?;
        self.sessions.remove(principal_id);

        info!(principal_id = %principal_id, "second factor enrolled");
        self.audit_ok(principal_id, AccessAction::TwoFactorEnroll);

        Ok(Enrollment {
            secret: secret_base32,
            provisioning_uri,
            backup_codes,
        })
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// `Ok(())` on a valid, unused code; `Err(InvalidCredential)` otherwise.
    pub async fn verify_code(&self, principal_id: &str, code: &str) -> TrustResult<()> {
        self.verify_code_at(principal_id, code, Utc::now()).await
    }

    pub async fn verify_code_at(
        &self,
        principal_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> TrustResult<()> {
        let action = AccessAction::TwoFactorVerify;
        self.require_active(principal_id, action).await?;

        let _guard = self.locks.lock(principal_id).await;
        let Some(mut credential) = self.credential(principal_id)?.filter(|c| c.enabled) else {
            self.audit_failed(principal_id, action, "not enrolled");
            return Err(TrustError::InvalidCredential);
        };

        let secret = Zeroizing::new(
            totp::base32_decode(&credential.secret_base32)
                .ok_or_else(|| TrustError::Integrity("stored secret is malformed".into()))?,
        );
        let current_step = totp::time_step(u64::try_from(now.timestamp()).unwrap_or(0));

        let Some(step) = totp::verify(&secret, code, current_step, credential.last_used_step)
        else {
            warn!(principal_id = %principal_id, "invalid one-time code");
            self.audit_failed(principal_id, action, "invalid or reused code");
            return Err(TrustError::InvalidCredential);
        };

        credential.last_used_step = Some(step);
        self.store
            .put(&RecordKey::TotpCredential(principal_id.to_string()), &credential)?;
        self.open_session(principal_id);

        self.audit_ok(principal_id, action);
        Ok(())
    }

    /// Consume one backup code. The removal and the outcome happen under the
    /// principal's lock, so a code succeeds at most once.
    pub async fn verify_backup_code(&self, principal_id: &str, code: &str) -> TrustResult<()> {
        let action = AccessAction::BackupCodeVerify;
        self.require_active(principal_id, action).await?;

        let _guard = self.locks.lock(principal_id).await;
        let mut codes = self.backup_codes(principal_id)?;
        if !codes.consume(principal_id, code) {
            warn!(principal_id = %principal_id, "invalid backup code");
            self.audit_failed(principal_id, action, "invalid or used backup code");
            return Err(TrustError::InvalidCredential);
        }
        self.store
            .put(&RecordKey::BackupCodes(principal_id.to_string()), &codes)?;
        self.open_session(principal_id);

        info!(
            principal_id = %principal_id,
            remaining = codes.remaining(),
            "backup code consumed"
        );
        self.audit_ok(principal_id, action);
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    fn open_session(&self, principal_id: &str) {
        self.sessions
            .insert(principal_id.to_string(), Instant::now());
    }

    pub fn has_verified_session(&self, principal_id: &str) -> bool {
        let live = self
            .sessions
            .get(principal_id)
            .is_some_and(|opened| opened.elapsed() < self.session_ttl);
        if !live {
            self.sessions.remove(principal_id);
        }
        live
    }

    pub fn require_verified_session(&self, principal_id: &str) -> TrustResult<()> {
        if self.has_verified_session(principal_id) {
            Ok(())
        } else {
            Err(TrustError::unauthorized("verified second factor required"))
        }
    }

    pub fn end_session(&self, principal_id: &str) {
        self.sessions.remove(principal_id);
    }

    // =========================================================================
    // Management
    // =========================================================================

    /// Purge the secret and the remaining backup codes.
    pub async fn disable(&self, principal_id: &str) -> TrustResult<()> {
        if let Err(e) = self.require_verified_session(principal_id) {
            self.audit_failed(principal_id, AccessAction::TwoFactorDisable, "no verified session");
            return Err(e);
        }

        let _guard = self.locks.lock(principal_id).await;
        self.store
            .remove(&RecordKey::TotpCredential(principal_id.to_string()))?;
        self.store
            .remove(&RecordKey::BackupCodes(principal_id.to_string()))?;
        self.sessions.remove(principal_id);

        info!(principal_id = %principal_id, "second factor disabled");
        self.audit_ok(principal_id, AccessAction::TwoFactorDisable);
        Ok(())
    }

    /// Replace all backup codes. Needs a verified session.
    pub async fn regenerate_backup_codes(&self, principal_id: &str) -> TrustResult<Vec<String>> {
        let action = AccessAction::BackupCodesRegenerate;
        if let Err(e) = self.require_verified_session(principal_id) {
            self.audit_failed(principal_id, action, "no verified session");
            return Err(e);
        }

        let _guard = self.locks.lock(principal_id).await;
        if !self.credential(principal_id)?.is_some_and(|c| c.enabled) {
            return Err(TrustError::NotFound(format!(
                "second factor for {principal_id}"
            )));
        }
        let (codes, display) = BackupCodeSet::generate(self.store.vault(), principal_id)?;
        self.store
            .put(&RecordKey::BackupCodes(principal_id.to_string()), &codes)?;

        self.audit_ok(principal_id, action);
        Ok(display)
    }

    pub async fn remaining_backup_codes(&self, principal_id: &str) -> TrustResult<usize> {
        let _guard = self.locks.lock(principal_id).await;
        Ok(self.backup_codes(principal_id)?.remaining())
    }

    pub async fn status(&self, principal_id: &str) -> TrustResult<TwoFactorStatus> {
        let _guard = self.locks.lock(principal_id).await;
        let credential = self.credential(principal_id)?;
        Ok(TwoFactorStatus {
            enabled: credential.as_ref().is_some_and(|c| c.enabled),
            remaining_backup_codes: self.backup_codes(principal_id)?.remaining(),
            verified_session: self.has_verified_session(principal_id),
            enrolled_at: credential.as_ref().map(|c| c.enrolled_at),
        })
    }
}
