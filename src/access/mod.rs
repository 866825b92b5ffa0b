// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Control
//!
//! Default-deny authorization and the append-only access log.
//!
//! ## Model
//!
//! - A [`Principal`] holds a set of [`Permission`]s seeded from its [`Role`]
//! - Inactive principals hold no effective permission
//! - Own-data permissions are scoped to the principal itself; child-data
//!   permissions to children whose `parent_id` is the principal
//! - Every check that gates a sensitive operation reads the authority;
//!   the local [`PrincipalCache`] is advisory

pub mod audit;
pub mod cache;
pub mod engine;
pub mod ownership;
pub mod permission;
pub mod principal;
pub mod role;

pub use audit::{AccessAction, AccessLog, AccessLogEntry};
pub use cache::PrincipalCache;
pub use engine::AccessControlEngine;
pub use ownership::FamilyScoped;
pub use permission::Permission;
pub use principal::Principal;
pub use role::Role;
