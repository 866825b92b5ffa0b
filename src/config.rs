// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, their defaults, and [`TrustConfig`], which is
//! read once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root of the vault key, sealed records and embedded authority | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `AUTHORITY_URL` | Remote authority base URL | unset (embedded redb) |
//! | `AUTHORITY_TIMEOUT_MS` | Remote authority request timeout | `5000` |
//! | `AUTHORITY_TOKEN` | Bearer token sent to the remote authority | unset |
//! | `AUTH_JWT_SECRET` | HS256 key for bearer tokens | Required unless built with `dev` |
//! | `BOOTSTRAP_ADMIN_ID` | Admin principal created on first start | unset |
//! | `TOTP_ISSUER` | Issuer shown in authenticator apps | `Guardian Trust` |
//! | `TWO_FACTOR_SESSION_SECS` | Lifetime of a verified second-factor session | `300` |
//! | `DEFAULT_MAX_DAILY_AMOUNT` | Daily payout limit for new parents (minor units) | `10000` |
//! | `DEFAULT_MAX_TRANSACTION_AMOUNT` | Per-payout limit for new parents | `5000` |
//! | `DEFAULT_MAX_MONTHLY_AMOUNT` | Monthly payout limit for new parents | `50000` |
//! | `RETENTION_SWEEP_SECS` | How often the sweeper checks the retention policy | `3600` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; both set enables HTTPS | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::finance::limits::{
    DEFAULT_MAX_DAILY_AMOUNT, DEFAULT_MAX_MONTHLY_AMOUNT, DEFAULT_MAX_TRANSACTION_AMOUNT,
};
use crate::finance::FinancialLimits;

/// Directory holding `keys/`, `records/`, `backups/` and `authority.redb`.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "/data";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// When set, principals, transactions and the retention policy live at this
/// remote authority instead of the embedded database.
pub const AUTHORITY_URL_ENV: &str = "AUTHORITY_URL";
pub const AUTHORITY_TIMEOUT_MS_ENV: &str = "AUTHORITY_TIMEOUT_MS";
pub const AUTHORITY_TOKEN_ENV: &str = "AUTHORITY_TOKEN";

/// HS256 secret for verifying `Authorization: Bearer` tokens.
pub const AUTH_JWT_SECRET_ENV: &str = "AUTH_JWT_SECRET";
pub const BOOTSTRAP_ADMIN_ID_ENV: &str = "BOOTSTRAP_ADMIN_ID";

pub const TOTP_ISSUER_ENV: &str = "TOTP_ISSUER";
pub const TWO_FACTOR_SESSION_SECS_ENV: &str = "TWO_FACTOR_SESSION_SECS";

pub const DEFAULT_MAX_DAILY_AMOUNT_ENV: &str = "DEFAULT_MAX_DAILY_AMOUNT";
pub const DEFAULT_MAX_TRANSACTION_AMOUNT_ENV: &str = "DEFAULT_MAX_TRANSACTION_AMOUNT";
pub const DEFAULT_MAX_MONTHLY_AMOUNT_ENV: &str = "DEFAULT_MAX_MONTHLY_AMOUNT";

pub const RETENTION_SWEEP_SECS_ENV: &str = "RETENTION_SWEEP_SECS";

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub authority_url: Option<String>,
    pub authority_timeout: Duration,
    pub authority_token: Option<String>,
    pub jwt_secret: Option<String>,
    pub bootstrap_admin_id: Option<String>,
    pub totp_issuer: String,
    pub two_factor_session_ttl: Duration,
    pub default_limits: FinancialLimits,
    pub retention_sweep_interval: Duration,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            host: "0.0.0.0".to_string(),
            port: 8080,
            authority_url: None,
            authority_timeout: Duration::from_millis(5000),
            authority_token: None,
            jwt_secret: None,
            bootstrap_admin_id: None,
            totp_issuer: "Guardian Trust".to_string(),
            two_factor_session_ttl: Duration::from_secs(300),
            default_limits: FinancialLimits {
                max_daily_amount: DEFAULT_MAX_DAILY_AMOUNT,
                max_transaction_amount: DEFAULT_MAX_TRANSACTION_AMOUNT,
                max_monthly_amount: DEFAULT_MAX_MONTHLY_AMOUNT,
            },
            retention_sweep_interval: Duration::from_secs(3600),
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    non_empty(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl TrustConfig {
    /// Read the environment. Unparseable numbers fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: non_empty(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            host: non_empty(HOST_ENV).unwrap_or(defaults.host),
            port: parsed(PORT_ENV, defaults.port),
            authority_url: non_empty(AUTHORITY_URL_ENV),
            authority_timeout: Duration::from_millis(parsed(AUTHORITY_TIMEOUT_MS_ENV, 5000)),
            authority_token: non_empty(AUTHORITY_TOKEN_ENV),
            jwt_secret: non_empty(AUTH_JWT_SECRET_ENV),
            bootstrap_admin_id: non_empty(BOOTSTRAP_ADMIN_ID_ENV),
            totp_issuer: non_empty(TOTP_ISSUER_ENV).unwrap_or(defaults.totp_issuer),
            two_factor_session_ttl: Duration::from_secs(parsed(TWO_FACTOR_SESSION_SECS_ENV, 300)),
            default_limits: FinancialLimits {
                max_daily_amount: parsed(
                    DEFAULT_MAX_DAILY_AMOUNT_ENV,
                    defaults.default_limits.max_daily_amount,
                ),
                max_transaction_amount: parsed(
                    DEFAULT_MAX_TRANSACTION_AMOUNT_ENV,
                    defaults.default_limits.max_transaction_amount,
                ),
                max_monthly_amount: parsed(
                    DEFAULT_MAX_MONTHLY_AMOUNT_ENV,
                    defaults.default_limits.max_monthly_amount,
                ),
            },
            retention_sweep_interval: Duration::from_secs(parsed(RETENTION_SWEEP_SECS_ENV, 3600)),
            tls_cert_path: non_empty(TLS_CERT_PATH_ENV).map(PathBuf::from),
            tls_key_path: non_empty(TLS_KEY_PATH_ENV).map(PathBuf::from),
        }
    }

    /// Both PEM paths, when HTTPS is configured.
    pub fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.tls_cert_path.as_ref().zip(self.tls_key_path.as_ref())
    }

    /// Data directory for tests and embedding.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let config = TrustConfig::default();
        assert!(config.default_limits.validate().is_ok());
        assert_eq!(config.two_factor_session_ttl, Duration::from_secs(300));
        assert!(config.tls_paths().is_none());
    }

    #[test]
    fn tls_needs_both_paths() {
        let mut config = TrustConfig::default();
        config.tls_cert_path = Some(PathBuf::from("/certs/server.pem"));
        assert!(config.tls_paths().is_none());
        config.tls_key_path = Some(PathBuf::from("/certs/server.key"));
        assert!(config.tls_paths().is_some());
    }

    #[test]
    fn parsed_falls_back_on_garbage() {
        // Unset variable.
        assert_eq!(parsed::<u16>("GUARDIAN_TRUST_TEST_UNSET_PORT", 8080), 8080);
    }
}
