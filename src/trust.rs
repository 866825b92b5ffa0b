// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wiring of the five components over one vault and one authority.

use std::sync::Arc;

use tracing::info;

use crate::access::{AccessControlEngine, AccessLog};
use crate::authority::{AuthorityBackend, EmbeddedAuthority, HttpAuthority};
use crate::config::TrustConfig;
use crate::error::TrustResult;
use crate::finance::FinancialTransactionWorkflow;
use crate::privacy::{PrivacyRetentionManager, RetentionSweeper};
use crate::two_factor::TwoFactorAuthenticator;
use crate::vault::{SealedStore, SecureVault};

#[derive(Clone)]
pub struct TrustCore {
    pub vault: Arc<SecureVault>,
    pub engine: Arc<AccessControlEngine>,
    pub privacy: Arc<PrivacyRetentionManager>,
    pub two_factor: Arc<TwoFactorAuthenticator>,
    pub finance: Arc<FinancialTransactionWorkflow>,
    sweep_interval: std::time::Duration,
}

impl TrustCore {
    /// Open the persistent vault under `config.data_dir` and connect the
    /// configured authority.
    pub async fn open(config: &TrustConfig) -> TrustResult<Self> {
        let vault = Arc::new(SecureVault::load(&config.data_dir)?);
        let authority: Arc<dyn AuthorityBackend> = match &config.authority_url {
            Some(url) => {
                info!(url = %url, "using remote authority");
                let client = HttpAuthority::new(url, config.authority_timeout)?;
                Arc::new(match &config.authority_token {
                    Some(token) => client.with_bearer_token(token),
                    None => client,
                })
            }
            None => {
                let path = vault.paths().authority_db();
                info!(path = %path.display(), "using embedded authority");
                Arc::new(EmbeddedAuthority::open(&path)?)
            }
        };
        Self::assemble(vault, authority, config).await
    }

    /// Build the components over an existing vault and authority.
    pub async fn assemble(
        vault: Arc<SecureVault>,
        authority: Arc<dyn AuthorityBackend>,
        config: &TrustConfig,
    ) -> TrustResult<Self> {
        let store = SealedStore::new(vault.clone());
        let engine = Arc::new(AccessControlEngine::new(
            authority,
            AccessLog::load(store.clone())?,
        ));
        if let Some(admin_id) = &config.bootstrap_admin_id {
            engine.bootstrap_admin(admin_id).await?;
            info!(admin_id = %admin_id, "bootstrap admin ready");
        }

        let privacy = Arc::new(PrivacyRetentionManager::new(engine.clone(), store.clone()));
        let two_factor = Arc::new(TwoFactorAuthenticator::new(
            engine.clone(),
            store.clone(),
            config.totp_issuer.clone(),
            config.two_factor_session_ttl,
        ));
        let finance = Arc::new(
            FinancialTransactionWorkflow::new(
                engine.clone(),
                two_factor.clone(),
                privacy.clone(),
                store,
            )
            .with_default_limits(config.default_limits),
        );

        Ok(Self {
            vault,
            engine,
            privacy,
            two_factor,
            finance,
            sweep_interval: config.retention_sweep_interval,
        })
    }

    pub fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(self.privacy.clone()).with_check_interval(self.sweep_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use tempfile::TempDir;

    #[tokio::test]
    async fn opens_embedded_core_with_bootstrap_admin() {
        let temp = TempDir::new().unwrap();
        let config = TrustConfig {
            bootstrap_admin_id: Some("root".into()),
            ..TrustConfig::default()
        }
        .with_data_dir(temp.path());

        let core = TrustCore::open(&config).await.unwrap();
        let admin = core.engine.principal("root").await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(temp.path().join("authority.redb").exists());
        drop(core);

        // Reopening keeps the admin and does not fail on the existing record.
        let core = TrustCore::open(&config).await.unwrap();
        assert!(core.engine.principal("root").await.unwrap().is_active);
    }
}
