// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the authenticated caller.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(caller): Auth) -> impl IntoResponse {
//!     // caller.principal_id is the verified `sub` claim
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, Validation};

use super::claims::TokenClaims;
use super::{AuthError, AuthenticatedPrincipal};
use crate::state::{AppState, AuthConfig};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor for authenticated callers.
///
/// ## Authentication Modes
///
/// - **Production** (`AUTH_JWT_SECRET` set): HS256 signature and expiry are verified.
/// - **Development** (`dev` feature, no secret): structure and expiry only.
pub struct Auth(pub AuthenticatedPrincipal);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Middleware or tests may have set the caller already.
        if let Some(caller) = parts.extensions.get::<AuthenticatedPrincipal>().cloned() {
            return Ok(Auth(caller));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let caller = verify_token(token, &state.auth_config)?;
        Ok(Auth(caller))
    }
}

/// Verify a bearer token and extract the caller.
pub fn verify_token(token: &str, config: &AuthConfig) -> Result<AuthenticatedPrincipal, AuthError> {
    match &config.key {
        Some(key) => {
            let mut validation = Validation::new(Algorithm::HS256);
            validation.leeway = CLOCK_SKEW_LEEWAY;
            validation.validate_nbf = true;

            let data = decode::<TokenClaims>(token, key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AuthError::InvalidSignature
                    }
                    jsonwebtoken::errors::ErrorKind::ImmatureSignature => {
                        AuthError::TokenNotYetValid
                    }
                    _ => AuthError::MalformedToken,
                }
            })?;
            non_empty_subject(data.claims)
        }
        None => verify_token_development(token),
    }
}

fn non_empty_subject(claims: TokenClaims) -> Result<AuthenticatedPrincipal, AuthError> {
    if claims.sub.trim().is_empty() {
        return Err(AuthError::MalformedToken);
    }
    Ok(claims.into())
}

/// Development decoding without a signature check.
///
/// WARNING: only compiled with the `dev` feature.
#[cfg(feature = "dev")]
fn verify_token_development(token: &str) -> Result<AuthenticatedPrincipal, AuthError> {
    let data = jsonwebtoken::dangerous::insecure_decode::<TokenClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?;

    let now = chrono::Utc::now().timestamp();
    if data.claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }
    non_empty_subject(data.claims)
}

#[cfg(not(feature = "dev"))]
fn verify_token_development(_token: &str) -> Result<AuthenticatedPrincipal, AuthError> {
    Err(AuthError::NotConfigured)
}
