// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Financial Transactions
//!
//! Conversion of earned points into a real-money payout request: risk
//! banding, per-parent limits, and the pending/terminal state machine held
//! by the authority.

pub mod limits;
pub mod risk;
pub mod transaction;
pub mod workflow;

pub use limits::{FinancialLimits, UsageCounter};
pub use risk::{KnownPayoutKeys, RiskAssessment};
pub use transaction::{
    mask_payout_key, RiskLevel, Transaction, TransactionStatus, TransactionUpdate,
    TransactionView,
};
pub use workflow::{CreateTransaction, FinancialTransactionWorkflow};
