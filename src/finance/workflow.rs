// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Payout Workflow
//!
//! Creates payout requests and drives them to a terminal state.
//!
//! ## Creation
//!
//! Under the parent's lock: band the risk, check the limits, submit to the
//! authority, and only after the authority acknowledged the transaction
//! reserve the amount in the usage counters. Two concurrent requests for the
//! same parent therefore never both pass a check only one of them could
//! satisfy, and a request that fails or is dropped before the authority
//! answers leaves the counters untouched.
//!
//! ## Transitions
//!
//! Approval, rejection and cancellation are compare-and-set against the
//! authority. When two transitions race, exactly one wins and the other sees
//! `InvalidState`. Rejection and cancellation release the reservation.
//!
//! Every public call writes exactly one access log entry. Terminal
//! transitions also write a `FINANCIAL` data-access entry for the child.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::limits::{FinancialLimits, UsageCounter};
use super::risk::{self, KnownPayoutKeys};
use super::transaction::{
    mask_payout_key, Transaction, TransactionStatus, TransactionUpdate, TransactionView,
};
use crate::access::{
    AccessAction, AccessControlEngine, AccessLogEntry, FamilyScoped, Permission, Principal, Role,
};
use crate::error::{TrustError, TrustResult};
use crate::locks::KeyedLocks;
use crate::privacy::{DataAccessLog, LogCategory, PrivacyRetentionManager};
use crate::two_factor::TwoFactorAuthenticator;
use crate::vault::{RecordKey, SealedStore};

pub const MAX_DESCRIPTION_CHARS: usize = 140;
pub const MAX_PAYOUT_KEY_CHARS: usize = 140;
pub const MAX_REASON_CHARS: usize = 280;
pub const MAX_HISTORY_DAYS: u32 = 3650;

/// Payout request as submitted by a parent or child.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateTransaction {
    pub parent_id: String,
    pub child_id: String,
    /// Minor currency units.
    pub amount: u64,
    /// Destination key. Sealed at rest; only a masked hint is returned.
    pub payout_key: String,
    #[serde(default)]
    pub description: String,
}

impl CreateTransaction {
    fn validate(&self) -> TrustResult<()> {
        if self.amount == 0 {
            return Err(TrustError::invalid_input("amount must be positive"));
        }
        let key_len = self.payout_key.trim().chars().count();
        if key_len == 0 || key_len > MAX_PAYOUT_KEY_CHARS {
            return Err(TrustError::invalid_input("payout key must be 1-140 characters"));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(TrustError::invalid_input(
                "description must be at most 140 characters",
            ));
        }
        Ok(())
    }
}

pub struct FinancialTransactionWorkflow {
    engine: Arc<AccessControlEngine>,
    two_factor: Arc<TwoFactorAuthenticator>,
    privacy: Arc<PrivacyRetentionManager>,
    store: SealedStore,
    /// Serialises usage-counter updates per parent.
    locks: KeyedLocks,
    default_limits: FinancialLimits,
}

impl FinancialTransactionWorkflow {
    pub fn new(
        engine: Arc<AccessControlEngine>,
        two_factor: Arc<TwoFactorAuthenticator>,
        privacy: Arc<PrivacyRetentionManager>,
        store: SealedStore,
    ) -> Self {
        Self {
            engine,
            two_factor,
            privacy,
            store,
            locks: KeyedLocks::new(),
            default_limits: FinancialLimits::default(),
        }
    }

    /// Limits applied to parents that never saved their own.
    pub fn with_default_limits(mut self, limits: FinancialLimits) -> Self {
        self.default_limits = limits;
        self
    }

    fn audit<T>(
        &self,
        actor_id: &str,
        action: AccessAction,
        resource: String,
        result: &TrustResult<T>,
    ) {
        let entry = AccessLogEntry::action(actor_id, action, resource);
        let entry = match result {
            Ok(_) => entry,
            Err(e) => entry.failed(e.to_string()),
        };
        self.engine.record_access(entry);
    }

    async fn log_financial(&self, tx: &Transaction, accessor_id: &str, action: &str) {
        let entry = DataAccessLog::new(&tx.child_id, accessor_id, LogCategory::Financial, action)
            .with_data_type("transaction")
            .with_purpose(format!("payout {}", tx.id));
        if let Err(e) = self.privacy.log_access(entry).await {
            warn!(transaction_id = %tx.id, error = %e, "failed to write financial data log");
        }
    }

    fn stored_limits(&self, parent_id: &str) -> TrustResult<FinancialLimits> {
        Ok(self
            .store
            .get(&RecordKey::Limits(parent_id.to_string()))?
            .unwrap_or(self.default_limits))
    }

    fn stored_usage(&self, parent_id: &str) -> TrustResult<UsageCounter> {
        let now = Utc::now();
        let mut usage = self
            .store
            .get(&RecordKey::Usage(parent_id.to_string()))?
            .unwrap_or_else(|| UsageCounter::starting(now));
        usage.roll(now);
        Ok(usage)
    }

    async fn load_transaction(&self, transaction_id: &str) -> TrustResult<Transaction> {
        self.engine
            .authority()
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| TrustError::NotFound(format!("transaction {transaction_id}")))
    }

    /// Holder of `ApproveTransaction` who is the transaction's parent, or an admin.
    async fn authorize_guardian(&self, actor_id: &str, tx: &Transaction) -> TrustResult<Principal> {
        if !self
            .engine
            .check_permission(actor_id, Permission::ApproveTransaction, None)
            .await
        {
            return Err(TrustError::unauthorized(format!(
                "{} required",
                Permission::ApproveTransaction
            )));
        }
        let principal = self.engine.principal(actor_id).await?;
        if principal.role != Role::Admin && tx.parent_id() != actor_id {
            return Err(TrustError::unauthorized(
                "not the guardian of this transaction",
            ));
        }
        Ok(principal)
    }

    /// A party to the transaction, or staff holding `ViewTransactionHistory`.
    async fn authorize_viewer(&self, actor_id: &str, tx: &Transaction) -> TrustResult<()> {
        let principal = self.engine.principal(actor_id).await?;
        let allowed = principal.is_active
            && (tx.is_party(actor_id)
                || (principal.role.is_staff()
                    && principal.holds(Permission::ViewTransactionHistory)));
        if allowed {
            Ok(())
        } else {
            Err(TrustError::unauthorized(format!(
                "{} required",
                Permission::ViewTransactionHistory
            )))
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    pub async fn create_transaction(
        &self,
        requester_id: &str,
        request: CreateTransaction,
    ) -> TrustResult<TransactionView> {
        let resource = format!("payout:{}", request.parent_id);
        let result = self.create_inner(requester_id, request).await;
        self.audit(requester_id, AccessAction::TransactionCreate, resource, &result);
        result
    }

    async fn create_inner(
        &self,
        requester_id: &str,
        request: CreateTransaction,
    ) -> TrustResult<TransactionView> {
        request.validate()?;
        if requester_id != request.parent_id && requester_id != request.child_id {
            return Err(TrustError::unauthorized(
                "requester must be the parent or the child",
            ));
        }
        if !self
            .engine
            .check_permission(requester_id, Permission::CreateTransaction, None)
            .await
        {
            return Err(TrustError::unauthorized(format!(
                "{} required",
                Permission::CreateTransaction
            )));
        }

        let parent = self.engine.principal(&request.parent_id).await?;
        if parent.role != Role::Parent || !parent.is_active {
            return Err(TrustError::invalid_input(format!(
                "{} is not an active parent",
                request.parent_id
            )));
        }
        let child = self.engine.principal(&request.child_id).await?;
        if !child.is_child_of(&parent.id) || !child.is_active {
            return Err(TrustError::invalid_input(format!(
                "{} is not an active child of {}",
                request.child_id, request.parent_id
            )));
        }

        let _guard = self.locks.lock(&parent.id).await;
        let limits = self.stored_limits(&parent.id)?;
        let mut usage = self.stored_usage(&parent.id)?;
        let key_record = RecordKey::PayoutKeys(parent.id.clone());
        let mut known: KnownPayoutKeys = self.store.get(&key_record)?.unwrap_or_default();

        let assessment = risk::assess(
            request.amount,
            &limits,
            known.is_novel(&request.payout_key),
            usage.transactions_today,
        );
        if assessment.is_rejected() {
            warn!(
                parent_id = %parent.id,
                amount = request.amount,
                "payout refused by risk assessment"
            );
            return Err(TrustError::RiskRejected {
                level: assessment.level,
                reason: assessment.reasons.join("; "),
            });
        }
        usage
            .check(&limits, request.amount)
            .map_err(TrustError::LimitExceeded)?;

        let payout_key = Zeroizing::new(request.payout_key.trim().to_string());
        let sealed_key = self.store.vault().seal(payout_key.as_bytes())?;
        let transaction = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: parent.id.clone(),
            child_id: child.id.clone(),
            requested_by: requester_id.to_string(),
            amount: request.amount,
            payout_key: sealed_key,
            payout_key_hint: mask_payout_key(&payout_key),
            description: request.description.trim().to_string(),
            status: TransactionStatus::Pending,
            risk_level: assessment.level,
            rejection_reason: None,
            created_at: Utc::now(),
            processed_at: None,
        };

        let transaction = self
            .engine
            .authority()
            .submit_transaction(transaction)
            .await?;

        usage.reserve(transaction.amount);
        self.store
            .put(&RecordKey::Usage(parent.id.clone()), &usage)?;
        if known.remember(&payout_key) {
            self.store.put(&key_record, &known)?;
        }

        info!(
            transaction_id = %transaction.id,
            parent_id = %transaction.parent_id,
            amount = transaction.amount,
            risk_level = %transaction.risk_level,
            payout_key = %transaction.payout_key_hint,
            "payout requested"
        );
        Ok(transaction.view())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `Pending -> Approved`. Needs `ApproveTransaction` and a verified
    /// second factor.
    pub async fn approve_transaction(
        &self,
        transaction_id: &str,
        approver_id: &str,
    ) -> TrustResult<TransactionView> {
        let result = self.approve_inner(transaction_id, approver_id).await;
        self.audit(
            approver_id,
            AccessAction::TransactionApprove,
            format!("transaction:{transaction_id}"),
            &result,
        );
        result
    }

    async fn approve_inner(
        &self,
        transaction_id: &str,
        approver_id: &str,
    ) -> TrustResult<TransactionView> {
        let tx = self.load_transaction(transaction_id).await?;
        self.authorize_guardian(approver_id, &tx).await?;
        ensure_pending(&tx)?;
        self.two_factor.require_verified_session(approver_id)?;

        let approved = self
            .engine
            .authority()
            .transition_transaction(
                transaction_id,
                TransactionStatus::Pending,
                TransactionUpdate::terminal(TransactionStatus::Approved, None),
            )
            .await?;

        info!(
            transaction_id = %transaction_id,
            approver_id = %approver_id,
            amount = approved.amount,
            "payout approved"
        );
        self.log_financial(&approved, approver_id, "TRANSACTION_APPROVED")
            .await;
        Ok(approved.view())
    }

    /// `Pending -> Rejected`, releasing the reservation.
    pub async fn reject_transaction(
        &self,
        transaction_id: &str,
        approver_id: &str,
        reason: &str,
    ) -> TrustResult<TransactionView> {
        let result = self.reject_inner(transaction_id, approver_id, reason).await;
        self.audit(
            approver_id,
            AccessAction::TransactionReject,
            format!("transaction:{transaction_id}"),
            &result,
        );
        result
    }

    async fn reject_inner(
        &self,
        transaction_id: &str,
        approver_id: &str,
        reason: &str,
    ) -> TrustResult<TransactionView> {
        let reason = reason.trim();
        if reason.is_empty() || reason.chars().count() > MAX_REASON_CHARS {
            return Err(TrustError::invalid_input("reason must be 1-280 characters"));
        }
        let tx = self.load_transaction(transaction_id).await?;
        self.authorize_guardian(approver_id, &tx).await?;
        ensure_pending(&tx)?;

        let rejected = self
            .finish(
                &tx,
                TransactionUpdate::terminal(TransactionStatus::Rejected, Some(reason.to_string())),
            )
            .await?;

        info!(
            transaction_id = %transaction_id,
            approver_id = %approver_id,
            "payout rejected"
        );
        self.log_financial(&rejected, approver_id, "TRANSACTION_REJECTED")
            .await;
        Ok(rejected.view())
    }

    /// `Pending -> Cancelled` by the requester or the parent.
    pub async fn cancel_transaction(
        &self,
        transaction_id: &str,
        requester_id: &str,
    ) -> TrustResult<TransactionView> {
        let result = self.cancel_inner(transaction_id, requester_id).await;
        self.audit(
            requester_id,
            AccessAction::TransactionCancel,
            format!("transaction:{transaction_id}"),
            &result,
        );
        result
    }

    async fn cancel_inner(
        &self,
        transaction_id: &str,
        requester_id: &str,
    ) -> TrustResult<TransactionView> {
        let tx = self.load_transaction(transaction_id).await?;
        let may_cancel = (tx.requested_by == requester_id || tx.parent_id == requester_id)
            && self
                .engine
                .check_permission(requester_id, Permission::CreateTransaction, None)
                .await;
        if !may_cancel {
            return Err(TrustError::unauthorized(
                "only the requester or the parent may cancel",
            ));
        }
        ensure_pending(&tx)?;

        let cancelled = self
            .finish(
                &tx,
                TransactionUpdate::terminal(TransactionStatus::Cancelled, None),
            )
            .await?;

        info!(
            transaction_id = %transaction_id,
            requester_id = %requester_id,
            "payout cancelled"
        );
        self.log_financial(&cancelled, requester_id, "TRANSACTION_CANCELLED")
            .await;
        Ok(cancelled.view())
    }

    /// Terminal transition that gives the amount back to the usage counters.
    async fn finish(&self, tx: &Transaction, update: TransactionUpdate) -> TrustResult<Transaction> {
        let _guard = self.locks.lock(&tx.parent_id).await;
        let finished = self
            .engine
            .authority()
            .transition_transaction(&tx.id, TransactionStatus::Pending, update)
            .await?;

        let mut usage = self.stored_usage(&tx.parent_id)?;
        usage.release(tx.amount, tx.created_at);
        self.store
            .put(&RecordKey::Usage(tx.parent_id.clone()), &usage)?;
        Ok(finished)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_transaction(
        &self,
        actor_id: &str,
        transaction_id: &str,
    ) -> TrustResult<TransactionView> {
        let result: TrustResult<TransactionView> = async {
            let tx = self.load_transaction(transaction_id).await?;
            self.authorize_viewer(actor_id, &tx).await?;
            Ok(tx.view())
        }
        .await;
        self.audit(
            actor_id,
            AccessAction::TransactionView,
            format!("transaction:{transaction_id}"),
            &result,
        );
        result
    }

    /// Transactions of `parent_id` from the last `window_days`, newest first.
    /// A child sees only its own.
    pub async fn get_history(
        &self,
        actor_id: &str,
        parent_id: &str,
        window_days: u32,
    ) -> TrustResult<Vec<TransactionView>> {
        let result = self.history_inner(actor_id, parent_id, window_days).await;
        self.audit(
            actor_id,
            AccessAction::TransactionHistory,
            format!("payout:{parent_id}"),
            &result,
        );
        result
    }

    async fn history_inner(
        &self,
        actor_id: &str,
        parent_id: &str,
        window_days: u32,
    ) -> TrustResult<Vec<TransactionView>> {
        if window_days == 0 || window_days > MAX_HISTORY_DAYS {
            return Err(TrustError::invalid_input("window must be 1-3650 days"));
        }
        let actor = self.engine.principal(actor_id).await?;
        let only_child = if (actor_id == parent_id || actor.role.is_staff())
            && actor.holds(Permission::ViewTransactionHistory)
        {
            None
        } else if actor.is_active && actor.is_child_of(parent_id) {
            Some(actor_id)
        } else {
            return Err(TrustError::unauthorized(format!(
                "{} required",
                Permission::ViewTransactionHistory
            )));
        };

        let since = Utc::now() - Duration::days(i64::from(window_days));
        let transactions = self
            .engine
            .authority()
            .list_transactions(parent_id, since)
            .await?;
        Ok(transactions
            .iter()
            .filter(|tx| only_child.is_none_or(|child| tx.child_id == child))
            .map(Transaction::view)
            .collect())
    }

    /// Plain payout key for the guardian who has to execute the transfer.
    pub async fn reveal_payout_key(
        &self,
        actor_id: &str,
        transaction_id: &str,
    ) -> TrustResult<String> {
        let result: TrustResult<String> = async {
            let tx = self.load_transaction(transaction_id).await?;
            self.authorize_guardian(actor_id, &tx).await?;
            let bytes = Zeroizing::new(self.store.vault().open(&tx.payout_key)?);
            let key = String::from_utf8(bytes.to_vec())
                .map_err(|_| TrustError::Integrity("payout key is not valid UTF-8".into()))?;
            self.log_financial(&tx, actor_id, "PAYOUT_KEY_REVEALED").await;
            Ok(key)
        }
        .await;
        self.audit(
            actor_id,
            AccessAction::PayoutKeyReveal,
            format!("transaction:{transaction_id}"),
            &result,
        );
        result
    }

    // =========================================================================
    // Limits
    // =========================================================================

    /// The parent itself, or staff holding `ViewTransactionHistory`.
    async fn authorize_limits_reader(&self, actor_id: &str, parent_id: &str) -> TrustResult<()> {
        let actor = self.engine.principal(actor_id).await?;
        let allowed = actor.is_active
            && (actor_id == parent_id
                || (actor.role.is_staff() && actor.holds(Permission::ViewTransactionHistory)));
        if allowed {
            Ok(())
        } else {
            Err(TrustError::unauthorized("limits are visible to the parent only"))
        }
    }

    pub async fn limits(&self, actor_id: &str, parent_id: &str) -> TrustResult<FinancialLimits> {
        let result: TrustResult<FinancialLimits> = async {
            self.authorize_limits_reader(actor_id, parent_id).await?;
            self.stored_limits(parent_id)
        }
        .await;
        self.audit(
            actor_id,
            AccessAction::LimitsView,
            format!("limits:{parent_id}"),
            &result,
        );
        result
    }

    pub async fn usage(&self, actor_id: &str, parent_id: &str) -> TrustResult<UsageCounter> {
        let result: TrustResult<UsageCounter> = async {
            self.authorize_limits_reader(actor_id, parent_id).await?;
            let _guard = self.locks.lock(parent_id).await;
            self.stored_usage(parent_id)
        }
        .await;
        self.audit(
            actor_id,
            AccessAction::LimitsView,
            format!("usage:{parent_id}"),
            &result,
        );
        result
    }

    /// The parent with a verified second factor, or an admin.
    pub async fn set_limits(
        &self,
        actor_id: &str,
        parent_id: &str,
        limits: FinancialLimits,
    ) -> TrustResult<FinancialLimits> {
        let result = self.set_limits_inner(actor_id, parent_id, limits).await;
        self.audit(
            actor_id,
            AccessAction::LimitsUpdate,
            format!("limits:{parent_id}"),
            &result,
        );
        result
    }

    async fn set_limits_inner(
        &self,
        actor_id: &str,
        parent_id: &str,
        limits: FinancialLimits,
    ) -> TrustResult<FinancialLimits> {
        limits.validate().map_err(TrustError::InvalidInput)?;
        let actor = self.engine.principal(actor_id).await?;
        if !actor.is_active {
            return Err(TrustError::unauthorized("inactive principal"));
        }
        match actor.role {
            Role::Admin => {}
            Role::Parent if actor_id == parent_id => {
                self.two_factor.require_verified_session(actor_id)?;
            }
            _ => {
                return Err(TrustError::unauthorized(
                    "only the parent or an admin may change limits",
                ))
            }
        }
        let parent = self.engine.principal(parent_id).await?;
        if parent.role != Role::Parent {
            return Err(TrustError::invalid_input(format!(
                "{parent_id} is not a parent"
            )));
        }

        let _guard = self.locks.lock(parent_id).await;
        self.store
            .put(&RecordKey::Limits(parent_id.to_string()), &limits)?;
        info!(
            actor_id = %actor_id,
            parent_id = %parent_id,
            max_daily_amount = limits.max_daily_amount,
            max_transaction_amount = limits.max_transaction_amount,
            max_monthly_amount = limits.max_monthly_amount,
            "financial limits updated"
        );
        Ok(limits)
    }
}

fn ensure_pending(tx: &Transaction) -> TrustResult<()> {
    if tx.status.is_terminal() {
        return Err(TrustError::InvalidState {
            transaction_id: tx.id.clone(),
            status: tx.status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessLog;
    use crate::authority::EmbeddedAuthority;
    use crate::error::LimitViolation;
    use crate::finance::RiskLevel;
    use crate::two_factor::DEFAULT_SESSION_TTL;
    use crate::vault::SecureVault;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        engine: Arc<AccessControlEngine>,
        two_factor: Arc<TwoFactorAuthenticator>,
        privacy: Arc<PrivacyRetentionManager>,
        workflow: Arc<FinancialTransactionWorkflow>,
    }

    async fn setup(limits: FinancialLimits) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = SealedStore::new(Arc::new(SecureVault::ephemeral(temp.path()).unwrap()));
        let authority =
            Arc::new(EmbeddedAuthority::open(&temp.path().join("authority.redb")).unwrap());
        let engine = Arc::new(AccessControlEngine::new(
            authority,
            AccessLog::load(store.clone()).unwrap(),
        ));
        engine.bootstrap_admin("admin").await.unwrap();
        engine.create_principal("p1", Role::Parent, None, None).await.unwrap();
        engine
            .create_principal("c1", Role::Child, Some("p1"), None)
            .await
            .unwrap();
        engine.create_principal("p2", Role::Parent, None, None).await.unwrap();

        let privacy = Arc::new(PrivacyRetentionManager::new(engine.clone(), store.clone()));
        let two_factor = Arc::new(TwoFactorAuthenticator::new(
            engine.clone(),
            store.clone(),
            "Guardian Trust",
            DEFAULT_SESSION_TTL,
        ));
        let workflow = Arc::new(
            FinancialTransactionWorkflow::new(
                engine.clone(),
                two_factor.clone(),
                privacy.clone(),
                store,
            )
            .with_default_limits(limits),
        );
        Fixture {
            _temp: temp,
            engine,
            two_factor,
            privacy,
            workflow,
        }
    }

    fn limits(max_tx: u64, daily: u64) -> FinancialLimits {
        FinancialLimits {
            max_daily_amount: daily,
            max_transaction_amount: max_tx,
            max_monthly_amount: daily * 31,
        }
    }

    fn request(amount: u64) -> CreateTransaction {
        CreateTransaction {
            parent_id: "p1".into(),
            child_id: "c1".into(),
            amount,
            payout_key: "alice@example.com".into(),
            description: "weekly chores".into(),
        }
    }

    async fn verified(f: &Fixture, principal_id: &str) {
        let enrollment = f
            .two_factor
            .enroll(principal_id, "guardian@example.com")
            .await
            .unwrap();
        f.two_factor
            .verify_backup_code(principal_id, &enrollment.backup_codes[0])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn child_requests_payout() {
        let f = setup(limits(1000, 5000)).await;
        let tx = f.workflow.create_transaction("c1", request(90)).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.requested_by, "c1");
        assert_eq!(tx.payout_key_hint, "****.com");
        assert_eq!(tx.risk_level, RiskLevel::Low);

        let usage = f.workflow.usage("p1", "p1").await.unwrap();
        assert_eq!(usage.daily_total, 90);
        assert_eq!(usage.transactions_today, 1);
    }

    #[tokio::test]
    async fn risk_bands_follow_amount() {
        let f = setup(limits(1000, 10_000)).await;
        let low = f.workflow.create_transaction("p1", request(90)).await.unwrap();
        let medium = f.workflow.create_transaction("p1", request(400)).await.unwrap();
        let high = f.workflow.create_transaction("p1", request(900)).await.unwrap();
        assert_eq!(low.risk_level, RiskLevel::Low);
        assert_eq!(medium.risk_level, RiskLevel::Medium);
        assert_eq!(high.risk_level, RiskLevel::High);

        let refused = f.workflow.create_transaction("p1", request(1200)).await;
        assert!(matches!(
            refused,
            Err(TrustError::RiskRejected {
                level: RiskLevel::Critical,
                ..
            })
        ));
        let history = f.workflow.get_history("p1", "p1", 1).await.unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn new_payout_key_escalates() {
        let f = setup(limits(1000, 10_000)).await;
        f.workflow.create_transaction("p1", request(50)).await.unwrap();
        let mut other = request(50);
        other.payout_key = "+5511987654321".into();
        let tx = f.workflow.create_transaction("p1", other).await.unwrap();
        assert_eq!(tx.risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn daily_limit_scenario() {
        let f = setup(limits(50, 50)).await;
        f.workflow.create_transaction("p1", request(40)).await.unwrap();

        let over = f.workflow.create_transaction("p1", request(20)).await;
        assert!(matches!(
            over,
            Err(TrustError::LimitExceeded(LimitViolation::Daily { used: 40, .. }))
        ));
        f.workflow.create_transaction("p1", request(10)).await.unwrap();
        assert_eq!(f.workflow.usage("p1", "p1").await.unwrap().daily_total, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_respect_daily_limit() {
        let f = setup(limits(100, 100)).await;
        let a = {
            let workflow = f.workflow.clone();
            tokio::spawn(async move { workflow.create_transaction("p1", request(60)).await })
        };
        let b = {
            let workflow = f.workflow.clone();
            tokio::spawn(async move { workflow.create_transaction("c1", request(60)).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let limited = results
            .iter()
            .filter(|r| matches!(r, Err(TrustError::LimitExceeded(_))))
            .count();
        assert_eq!((ok, limited), (1, 1));
        assert_eq!(f.workflow.usage("p1", "p1").await.unwrap().daily_total, 60);
    }

    #[tokio::test]
    async fn outsiders_cannot_request() {
        let f = setup(limits(1000, 5000)).await;
        let result = f.workflow.create_transaction("p2", request(10)).await;
        assert!(matches!(result, Err(TrustError::Unauthorized(_))));

        let mut unlinked = request(10);
        unlinked.parent_id = "p2".into();
        let result = f.workflow.create_transaction("p2", unlinked).await;
        assert!(matches!(result, Err(TrustError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn input_is_validated() {
        let f = setup(limits(1000, 5000)).await;
        let result = f.workflow.create_transaction("p1", request(0)).await;
        assert!(matches!(result, Err(TrustError::InvalidInput(_))));

        let mut long = request(10);
        long.description = "x".repeat(141);
        let result = f.workflow.create_transaction("p1", long).await;
        assert!(matches!(result, Err(TrustError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn approval_needs_verified_session() {
        let f = setup(limits(1000, 5000)).await;
        let tx = f.workflow.create_transaction("c1", request(90)).await.unwrap();

        let denied = f.workflow.approve_transaction(&tx.id, "p1").await;
        assert!(matches!(denied, Err(TrustError::Unauthorized(_))));

        verified(&f, "p1").await;
        let approved = f.workflow.approve_transaction(&tx.id, "p1").await.unwrap();
        assert_eq!(approved.status, TransactionStatus::Approved);
        assert!(approved.processed_at.is_some());

        let logs = f.privacy.data_logs("c1", "c1").await.unwrap();
        assert!(logs
            .iter()
            .any(|l| l.category == LogCategory::Financial && l.action == "TRANSACTION_APPROVED"));
    }

    #[tokio::test]
    async fn terminal_transactions_stay_terminal() {
        let f = setup(limits(1000, 5000)).await;
        verified(&f, "p1").await;
        let tx = f.workflow.create_transaction("c1", request(90)).await.unwrap();
        f.workflow.approve_transaction(&tx.id, "p1").await.unwrap();

        let again = f.workflow.approve_transaction(&tx.id, "p1").await;
        assert!(matches!(
            again,
            Err(TrustError::InvalidState {
                status: TransactionStatus::Approved,
                ..
            })
        ));
        let reject = f.workflow.reject_transaction(&tx.id, "p1", "changed mind").await;
        assert!(matches!(reject, Err(TrustError::InvalidState { .. })));

        let current = f.workflow.get_transaction("p1", &tx.id).await.unwrap();
        assert_eq!(current.status, TransactionStatus::Approved);
        assert!(current.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn rejection_releases_reservation() {
        let f = setup(limits(100, 100)).await;
        let tx = f.workflow.create_transaction("c1", request(80)).await.unwrap();
        let rejected = f
            .workflow
            .reject_transaction(&tx.id, "p1", "not this week")
            .await
            .unwrap();
        assert_eq!(rejected.status, TransactionStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("not this week"));
        assert_eq!(f.workflow.usage("p1", "p1").await.unwrap().daily_total, 0);

        let again = f.workflow.reject_transaction(&tx.id, "p1", "again").await;
        assert!(matches!(again, Err(TrustError::InvalidState { .. })));
        assert_eq!(f.workflow.usage("p1", "p1").await.unwrap().daily_total, 0);
    }

    #[tokio::test]
    async fn child_cancels_own_request() {
        let f = setup(limits(100, 100)).await;
        let tx = f.workflow.create_transaction("c1", request(30)).await.unwrap();

        let outsider = f.workflow.cancel_transaction(&tx.id, "p2").await;
        assert!(matches!(outsider, Err(TrustError::Unauthorized(_))));

        let cancelled = f.workflow.cancel_transaction(&tx.id, "c1").await.unwrap();
        assert_eq!(cancelled.status, TransactionStatus::Cancelled);
        assert_eq!(f.workflow.usage("p1", "p1").await.unwrap().daily_total, 0);
    }

    #[tokio::test]
    async fn reads_are_scoped_to_the_family() {
        let f = setup(limits(1000, 5000)).await;
        let tx = f.workflow.create_transaction("c1", request(10)).await.unwrap();

        assert!(f.workflow.get_transaction("c1", &tx.id).await.is_ok());
        assert!(f.workflow.get_transaction("admin", &tx.id).await.is_ok());
        let other = f.workflow.get_transaction("p2", &tx.id).await;
        assert!(matches!(other, Err(TrustError::Unauthorized(_))));

        let history = f.workflow.get_history("p2", "p1", 30).await;
        assert!(matches!(history, Err(TrustError::Unauthorized(_))));
        assert_eq!(f.workflow.get_history("c1", "p1", 30).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payout_key_is_sealed_and_revealed_to_guardian_only() {
        let f = setup(limits(1000, 5000)).await;
        let tx = f.workflow.create_transaction("c1", request(10)).await.unwrap();

        let stored = f
            .engine
            .authority()
            .get_transaction(&tx.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!String::from_utf8_lossy(&stored.payout_key.ciphertext).contains("alice"));

        let denied = f.workflow.reveal_payout_key("c1", &tx.id).await;
        assert!(matches!(denied, Err(TrustError::Unauthorized(_))));
        let key = f.workflow.reveal_payout_key("p1", &tx.id).await.unwrap();
        assert_eq!(key, "alice@example.com");
    }

    #[tokio::test]
    async fn every_call_is_audited_once() {
        let f = setup(limits(100, 100)).await;
        let before = f.engine.access_log().entries_for("p2").len();
        let _ = f.workflow.create_transaction("p2", request(10)).await;
        let entries = f.engine.access_log().entries_for("p2");
        assert_eq!(entries.len(), before + 1);
        let last = entries.last().unwrap();
        assert_eq!(last.action, "TRANSACTION_CREATE");
        assert!(!last.success);
        assert_eq!(last.category, LogCategory::Financial);
    }

    #[tokio::test]
    async fn limits_need_second_factor_for_parents() {
        let f = setup(limits(100, 100)).await;
        let new_limits = limits(200, 400);

        let denied = f.workflow.set_limits("p1", "p1", new_limits).await;
        assert!(matches!(denied, Err(TrustError::Unauthorized(_))));

        verified(&f, "p1").await;
        f.workflow.set_limits("p1", "p1", new_limits).await.unwrap();
        assert_eq!(f.workflow.limits("p1", "p1").await.unwrap(), new_limits);

        f.workflow.set_limits("admin", "p1", limits(50, 100)).await.unwrap();
        let child = f.workflow.set_limits("c1", "p1", new_limits).await;
        assert!(matches!(child, Err(TrustError::Unauthorized(_))));
        let other = f.workflow.limits("p2", "p1").await;
        assert!(matches!(other, Err(TrustError::Unauthorized(_))));
    }
}
