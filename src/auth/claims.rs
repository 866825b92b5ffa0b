// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token claims and the authenticated caller.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims read from an HS256 bearer token.
///
/// Roles and permissions are deliberately absent: they are looked up at the
/// authority for every decision, never trusted from the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal id.
    pub sub: String,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

/// Caller identity established by the `Auth` extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedPrincipal {
    pub principal_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Token expiry (Unix seconds).
    #[serde(skip)]
    pub expires_at: i64,
}

impl From<TokenClaims> for AuthenticatedPrincipal {
    fn from(claims: TokenClaims) -> Self {
        Self {
            principal_id: claims.sub,
            session_id: claims.sid,
            expires_at: claims.exp,
        }
    }
}
