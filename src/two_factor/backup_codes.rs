// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Single-use backup codes.
//!
//! Codes are shown once as `XXXX-XXXX`. Only salted SHA-256 digests are
//! kept, sealed under `backupCodes:{principal}`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::constant_time_eq;
use crate::vault::{SecureVault, VaultResult};

pub const BACKUP_CODE_COUNT: usize = 10;
pub const BACKUP_CODE_LEN: usize = 8;

/// No 0/O or 1/I. 32 symbols, so `byte & 31` is unbiased.
const ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Digests of the codes not yet consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCodeSet {
    digests: Vec<String>,
}

impl BackupCodeSet {
    /// Fresh set of unique codes. Returns the set and the displayable codes.
    pub fn generate(vault: &SecureVault, principal_id: &str) -> VaultResult<(Self, Vec<String>)> {
        let mut codes: Vec<String> = Vec::with_capacity(BACKUP_CODE_COUNT);
        while codes.len() < BACKUP_CODE_COUNT {
            let code = random_code(vault)?;
            if !codes.contains(&code) {
                codes.push(code);
            }
        }

        let digests = codes
            .iter()
            .map(|code| digest(principal_id, code))
            .collect();
        let display = codes.iter().map(|c| format_code(c)).collect();
        Ok((Self { digests }, display))
    }

    pub fn remaining(&self) -> usize {
        self.digests.len()
    }

    /// Remove `input` if it is an unused code. No mutation on a miss.
    pub fn consume(&mut self, principal_id: &str, input: &str) -> bool {
        let Some(normalized) = normalize(input) else {
            return false;
        };
        let candidate = digest(principal_id, &normalized);

        let mut hit = None;
        for (index, stored) in self.digests.iter().enumerate() {
            if constant_time_eq(stored.as_bytes(), candidate.as_bytes()) && hit.is_none() {
                hit = Some(index);
            }
        }
        match hit {
            Some(index) => {
                self.digests.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

fn random_code(vault: &SecureVault) -> VaultResult<String> {
    let mut bytes = [0u8; BACKUP_CODE_LEN];
    vault.fill_random(&mut bytes)?;
    Ok(bytes
        .iter()
        .map(|b| ALPHABET[(b & 0x1F) as usize] as char)
        .collect())
}

fn format_code(code: &str) -> String {
    let (head, tail) = code.split_at(BACKUP_CODE_LEN / 2);
    format!("{head}-{tail}")
}

/// Uppercase, strip dashes and whitespace, and check the alphabet.
pub fn normalize(input: &str) -> Option<String> {
    let normalized: String = input
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let valid = normalized.len() == BACKUP_CODE_LEN
        && normalized.bytes().all(|b| ALPHABET.contains(&b));
    valid.then_some(normalized)
}

fn digest(principal_id: &str, normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(principal_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}
