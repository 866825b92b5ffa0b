// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian Trust - access, privacy, second factor and payouts
//!
//! The trust and access layer of a family task/reward app: who may act on
//! whose data, what is sealed at rest, how long activity is remembered, and
//! how points become money.
//!
//! ## Modules
//!
//! - `vault` - AES-256-GCM sealing with a device key, secure erase, backups
//! - `access` - default-deny permissions, family scoping, the access log
//! - `authority` - the shared source of truth (embedded redb or remote HTTP)
//! - `privacy` - settings, data-access logs, retention, export and erasure
//! - `two_factor` - guardian TOTP, backup codes and verified sessions
//! - `finance` - payout requests, limits, risk and approval
//! - `api` / `auth` - HTTP surface (Axum) and bearer token verification

pub mod access;
pub mod api;
pub mod auth;
pub mod authority;
pub mod config;
pub mod error;
pub mod finance;
pub mod locks;
pub mod privacy;
pub mod state;
pub mod trust;
pub mod two_factor;
pub mod vault;

pub use error::{TrustError, TrustResult};
pub use trust::TrustCore;
