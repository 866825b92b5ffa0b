// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Risk banding for payout requests.
//!
//! The amount band relative to `max_transaction_amount` is authoritative.
//! A payout key the parent has not used before and a busy day each raise the
//! level by one band, up to `High`. Nothing lowers it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use super::{FinancialLimits, RiskLevel};

/// Transactions already created today at which velocity escalation starts.
pub const VELOCITY_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    pub fn is_rejected(&self) -> bool {
        self.level == RiskLevel::Critical
    }
}

/// Band `amount` against `max_transaction_amount`: up to 10% Low, up to
/// 50% Medium, up to 100% High, above it Critical.
pub fn amount_band(amount: u64, max_transaction_amount: u64) -> RiskLevel {
    let amount = u128::from(amount);
    let max = u128::from(max_transaction_amount);
    if amount > max {
        RiskLevel::Critical
    } else if amount * 10 <= max {
        RiskLevel::Low
    } else if amount * 2 <= max {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

pub fn assess(
    amount: u64,
    limits: &FinancialLimits,
    novel_payout_key: bool,
    transactions_today: u32,
) -> RiskAssessment {
    let mut level = amount_band(amount, limits.max_transaction_amount);
    let mut reasons = Vec::new();
    if level == RiskLevel::Critical {
        reasons.push(format!(
            "amount {amount} exceeds the per-transaction limit of {}",
            limits.max_transaction_amount
        ));
        return RiskAssessment { level, reasons };
    }

    if novel_payout_key {
        level = level.escalate();
        reasons.push("payout key not used before".to_string());
    }
    if transactions_today >= VELOCITY_THRESHOLD {
        level = level.escalate();
        reasons.push(format!("{transactions_today} transactions already today"));
    }
    RiskAssessment { level, reasons }
}

/// Fingerprints of the payout keys a parent has used, sealed under
/// `pixKey:{parent}`. Raw keys are never stored here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPayoutKeys {
    fingerprints: BTreeSet<String>,
}

impl KnownPayoutKeys {
    /// A key counts as novel once the parent has a history and this key is
    /// not part of it. The first key a parent ever uses is not escalated.
    pub fn is_novel(&self, payout_key: &str) -> bool {
        !self.fingerprints.is_empty() && !self.fingerprints.contains(&fingerprint(payout_key))
    }

    pub fn remember(&mut self, payout_key: &str) -> bool {
        self.fingerprints.insert(fingerprint(payout_key))
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

/// Hex SHA-256 of the NFKC-normalised, trimmed, lowercased key.
pub fn fingerprint(payout_key: &str) -> String {
    let normalized: String = payout_key.trim().nfkc().collect::<String>().to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_tx: u64) -> FinancialLimits {
        FinancialLimits {
            max_daily_amount: max_tx * 10,
            max_transaction_amount: max_tx,
            max_monthly_amount: max_tx * 100,
        }
    }

    #[test]
    fn amount_bands() {
        assert_eq!(amount_band(90, 1000), RiskLevel::Low);
        assert_eq!(amount_band(100, 1000), RiskLevel::Low);
        assert_eq!(amount_band(101, 1000), RiskLevel::Medium);
        assert_eq!(amount_band(400, 1000), RiskLevel::Medium);
        assert_eq!(amount_band(500, 1000), RiskLevel::Medium);
        assert_eq!(amount_band(900, 1000), RiskLevel::High);
        assert_eq!(amount_band(1000, 1000), RiskLevel::High);
        assert_eq!(amount_band(1200, 1000), RiskLevel::Critical);
        assert_eq!(amount_band(u64::MAX, u64::MAX), RiskLevel::High);
    }

    #[test]
    fn modifiers_only_escalate() {
        let base = assess(90, &limits(1000), false, 0);
        assert_eq!(base.level, RiskLevel::Low);
        assert!(base.reasons.is_empty());

        let novel = assess(90, &limits(1000), true, 0);
        assert_eq!(novel.level, RiskLevel::Medium);

        let busy = assess(90, &limits(1000), true, VELOCITY_THRESHOLD);
        assert_eq!(busy.level, RiskLevel::High);
        assert_eq!(busy.reasons.len(), 2);

        let capped = assess(900, &limits(1000), true, 10);
        assert_eq!(capped.level, RiskLevel::High);
        assert!(!capped.is_rejected());
    }

    #[test]
    fn over_limit_is_rejected() {
        let assessment = assess(1200, &limits(1000), false, 0);
        assert!(assessment.is_rejected());
    }

    #[test]
    fn fingerprints_normalise_input() {
        assert_eq!(fingerprint(" Alice@Example.com "), fingerprint("alice@example.com"));
        // Fullwidth digits fold under NFKC.
        assert_eq!(fingerprint("１２３"), fingerprint("123"));
        assert_ne!(fingerprint("123"), fingerprint("124"));
    }

    #[test]
    fn fingerprint_is_lowercase_hex_sha256() {
        assert_eq!(
            fingerprint("ABC"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn first_key_is_not_novel() {
        let mut known = KnownPayoutKeys::default();
        assert!(!known.is_novel("alice@example.com"));
        assert!(known.remember("alice@example.com"));
        assert!(!known.remember("ALICE@example.com"));
        assert!(!known.is_novel("alice@example.com"));
        assert!(known.is_novel("mallory@example.com"));
        assert_eq!(known.len(), 1);
    }
}
