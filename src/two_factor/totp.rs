// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! RFC 6238 time-based one-time codes (HMAC-SHA1, 6 digits, 30 s step).

use ring::hmac;
use url::Url;

use super::constant_time_eq;

pub const SECRET_LEN: usize = 20;
pub const DIGITS: u32 = 6;
pub const STEP_SECS: u64 = 30;
/// Accepted steps either side of the current one.
pub const SKEW_STEPS: u64 = 1;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// RFC 4648 base32, unpadded.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1F) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1F) as usize] as char);
    }
    out
}

/// Decode RFC 4648 base32. Case, padding and spaces are ignored.
pub fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in input.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let upper = c.to_ascii_uppercase() as u8;
        let value = BASE32_ALPHABET.iter().position(|&a| a == upper)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    Some(out)
}

pub fn time_step(unix_secs: u64) -> u64 {
    unix_secs / STEP_SECS
}

/// RFC 4226 HOTP value for `counter`.
pub fn hotp(secret: &[u8], counter: u64) -> u32 {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, secret);
    let tag = hmac::sign(&key, &counter.to_be_bytes());
    let digest = tag.as_ref();

    let offset = (digest[digest.len() - 1] & 0x0F) as usize;
    let binary = (u32::from(digest[offset]) & 0x7F) << 24
        | u32::from(digest[offset + 1]) << 16
        | u32::from(digest[offset + 2]) << 8
        | u32::from(digest[offset + 3]);
    binary % 10u32.pow(DIGITS)
}

pub fn code_at(secret: &[u8], step: u64) -> String {
    format!("{:0width$}", hotp(secret, step), width = DIGITS as usize)
}

/// Match `code` against the steps around `current_step`, skipping any step
/// at or before `last_used_step`. Returns the matched step.
pub fn verify(
    secret: &[u8],
    code: &str,
    current_step: u64,
    last_used_step: Option<u64>,
) -> Option<u64> {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let first = current_step.saturating_sub(SKEW_STEPS);
    let mut matched = None;
    for step in first..=current_step + SKEW_STEPS {
        if last_used_step.is_some_and(|used| step <= used) {
            continue;
        }
        // Check every candidate so timing does not reveal which step hit.
        if constant_time_eq(code_at(secret, step).as_bytes(), code.as_bytes()) && matched.is_none()
        {
            matched = Some(step);
        }
    }
    matched
}

/// `otpauth://totp/{issuer}:{account}?secret=...` for authenticator apps.
pub fn provisioning_uri(issuer: &str, account: &str, secret_base32: &str) -> Option<String> {
    let mut url = Url::parse("otpauth://totp/").ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push(&format!("{issuer}:{account}"));
    url.query_pairs_mut()
        .append_pair("secret", secret_base32)
        .append_pair("issuer", issuer)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", &DIGITS.to_string())
        .append_pair("period", &STEP_SECS.to_string());
    Some(url.to_string())
}
