// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Establishes who is calling. What the caller may do is decided by the
//! access engine against the authority, never by token contents.
//!
//! ## Auth Flow
//!
//! 1. The app's sign-in service issues an HS256 token whose `sub` is the principal id
//! 2. Clients send `Authorization: Bearer <token>`
//! 3. The server verifies signature and expiry and hands the principal id to the core
//!
//! ## Security
//!
//! - All non-health endpoints require authentication
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;

pub use claims::AuthenticatedPrincipal;
pub use error::AuthError;
pub use extractor::Auth;
