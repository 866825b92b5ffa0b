// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use jsonwebtoken::DecodingKey;

use crate::trust::TrustCore;

/// Bearer token verification settings.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// HS256 key. `None` rejects every token unless built with `dev`.
    pub key: Option<DecodingKey>,
}

impl AuthConfig {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            key: Some(DecodingKey::from_secret(secret)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub core: TrustCore,
    pub auth_config: AuthConfig,
}

impl AppState {
    pub fn new(core: TrustCore) -> Self {
        Self {
            core,
            auth_config: AuthConfig::default(),
        }
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }
}
