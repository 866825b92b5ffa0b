// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Privacy and Retention
//!
//! Per-principal preferences, the bounded data-access log, retention
//! enforcement, and the subject rights of export and erasure. Everything
//! stored here is sealed by the vault.

pub mod data_log;
pub mod manager;
pub mod retention;
pub mod settings;
pub mod sweeper;

pub use data_log::{DataAccessLog, DataLogRing, DATA_LOG_CAPACITY};
pub use manager::{
    CleanupReport, ErasureReport, ExportReceipt, PrivacyRetentionManager, UserDataExport,
};
pub use retention::{LogCategory, RetentionPolicy};
pub use settings::{NotificationPreferences, PrivacySettings, SharingPreferences};
pub use sweeper::RetentionSweeper;
