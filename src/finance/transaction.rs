// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payout transactions and their state machine.
//!
//! ```text
//! Pending -> Approved | Rejected | Cancelled
//! ```
//!
//! Terminal states are one-way. `processed_at` is set exactly when the
//! status is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::access::FamilyScoped;
use crate::vault::EncryptedBlob;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Approved => write!(f, "approved"),
            TransactionStatus::Rejected => write!(f, "rejected"),
            TransactionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// One band up, never past `High`. Only amount banding yields `Critical`.
    pub fn escalate(self) -> RiskLevel {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium | RiskLevel::High => RiskLevel::High,
            RiskLevel::Critical => RiskLevel::Critical,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// A payout request as held by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub parent_id: String,
    pub child_id: String,
    /// Principal that asked for the payout (the parent or the child).
    pub requested_by: String,
    /// Minor currency units.
    pub amount: u64,
    /// Sealed payout key. Only the sealing device can open it.
    pub payout_key: EncryptedBlob,
    pub payout_key_hint: String,
    pub description: String,
    pub status: TransactionStatus,
    pub risk_level: RiskLevel,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Field changes of a terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub processed_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
}

impl TransactionUpdate {
    pub fn terminal(status: TransactionStatus, rejection_reason: Option<String>) -> Self {
        Self {
            status,
            processed_at: Utc::now(),
            rejection_reason,
        }
    }
}

impl Transaction {
    pub fn apply(&mut self, update: TransactionUpdate) {
        self.status = update.status;
        self.processed_at = Some(update.processed_at);
        self.rejection_reason = update.rejection_reason;
    }

    pub fn view(&self) -> TransactionView {
        TransactionView {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            child_id: self.child_id.clone(),
            requested_by: self.requested_by.clone(),
            amount: self.amount,
            payout_key_hint: self.payout_key_hint.clone(),
            description: self.description.clone(),
            status: self.status,
            risk_level: self.risk_level,
            rejection_reason: self.rejection_reason.clone(),
            created_at: self.created_at,
            processed_at: self.processed_at,
        }
    }
}

impl FamilyScoped for Transaction {
    fn parent_id(&self) -> &str {
        &self.parent_id
    }

    fn child_id(&self) -> Option<&str> {
        Some(&self.child_id)
    }
}

/// Transaction as returned to callers: the payout key appears only masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionView {
    pub id: String,
    pub parent_id: String,
    pub child_id: String,
    pub requested_by: String,
    pub amount: u64,
    pub payout_key_hint: String,
    pub description: String,
    pub status: TransactionStatus,
    pub risk_level: RiskLevel,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Mask a payout key down to its last four characters.
pub fn mask_payout_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_caps_at_high() {
        assert_eq!(RiskLevel::Low.escalate(), RiskLevel::Medium);
        assert_eq!(RiskLevel::Medium.escalate(), RiskLevel::High);
        assert_eq!(RiskLevel::High.escalate(), RiskLevel::High);
        assert_eq!(RiskLevel::Critical.escalate(), RiskLevel::Critical);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Approved.is_terminal());
        assert!(TransactionStatus::Rejected.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn masking_hides_all_but_tail() {
        assert_eq!(mask_payout_key("alice@example.com"), "****.com");
        assert_eq!(mask_payout_key("123"), "****");
        assert_eq!(mask_payout_key("+5511987654321"), "****4321");
    }

    #[test]
    fn apply_sets_processed_at() {
        let mut tx = Transaction {
            id: "tx".into(),
            parent_id: "p".into(),
            child_id: "c".into(),
            requested_by: "c".into(),
            amount: 10,
            payout_key: EncryptedBlob {
                ciphertext: vec![1],
                nonce: vec![0; 12],
                auth_tag: vec![0; 16],
            },
            payout_key_hint: "****".into(),
            description: String::new(),
            status: TransactionStatus::Pending,
            risk_level: RiskLevel::Low,
            rejection_reason: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        tx.apply(TransactionUpdate::terminal(
            TransactionStatus::Rejected,
            Some("no".into()),
        ));
        assert_eq!(tx.status, TransactionStatus::Rejected);
        assert!(tx.processed_at.is_some());
        assert_eq!(tx.view().rejection_reason.as_deref(), Some("no"));
    }
}
