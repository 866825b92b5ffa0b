// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Two-Factor Authentication
//!
//! TOTP enrollment and verification for guardians, single-use backup codes,
//! and the short-lived verified session that gates sensitive operations such
//! as approving a payout.

pub mod authenticator;
pub mod backup_codes;
pub mod totp;

pub use authenticator::{Enrollment, TwoFactorAuthenticator, TwoFactorStatus, DEFAULT_SESSION_TTL};
pub use backup_codes::{BackupCodeSet, BACKUP_CODE_COUNT};

/// Byte comparison whose running time depends only on the lengths.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
