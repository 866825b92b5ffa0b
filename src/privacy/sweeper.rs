// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Retention Sweeper
//!
//! Background task that enforces the retention policy without a caller.
//!
//! ## Strategy
//!
//! Every `check_interval` the sweeper reads the authoritative policy. When
//! `auto_cleanup` is set and at least `cleanup_interval_hours` have passed
//! since the last run, it runs `cleanup_expired_data`. Cleanup is
//! idempotent, so an extra run after a restart is harmless.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::PrivacyRetentionManager;

/// Default interval between policy checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

pub struct RetentionSweeper {
    privacy: Arc<PrivacyRetentionManager>,
    check_interval: Duration,
    last_run: Option<Instant>,
}

impl RetentionSweeper {
    pub fn new(privacy: Arc<PrivacyRetentionManager>) -> Self {
        Self {
            privacy,
            check_interval: DEFAULT_CHECK_INTERVAL,
            last_run: None,
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Run the sweeper loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            "Retention sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Retention sweeper shutting down");
                return;
            }

            self.sweep_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.check_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Retention sweeper shutting down");
                    return;
                }
            }
        }
    }

    /// One check: run cleanup if the policy says it is due. Returns whether
    /// a cleanup ran.
    async fn sweep_step(&mut self) -> bool {
        let policy = match self.privacy.retention_policy().await {
            Ok(policy) => policy,
            Err(e) => {
                warn!(error = %e, "Retention sweeper: policy unavailable, skipping");
                return false;
            }
        };
        if !policy.auto_cleanup {
            return false;
        }

        let cadence = Duration::from_secs(u64::from(policy.cleanup_interval_hours) * 3600);
        if self.last_run.is_some_and(|at| at.elapsed() < cadence) {
            return false;
        }

        match self.privacy.cleanup_expired_data().await {
            Ok(report) => {
                info!(
                    access_log_removed = report.access_log_removed,
                    data_log_removed = report.data_log_removed,
                    "Retention sweeper: cleanup complete"
                );
                self.last_run = Some(Instant::now());
                true
            }
            Err(e) => {
                warn!(error = %e, "Retention sweeper: cleanup failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessControlEngine, AccessLog, AccessLogEntry};
    use crate::authority::{AuthorityBackend, EmbeddedAuthority};
    use crate::privacy::RetentionPolicy;
    use crate::vault::{SealedStore, SecureVault};
    use chrono::{Duration as ChronoDuration, Utc};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<AccessControlEngine>, Arc<PrivacyRetentionManager>) {
        let temp = TempDir::new().unwrap();
        let store = SealedStore::new(Arc::new(SecureVault::ephemeral(temp.path()).unwrap()));
        let authority =
            Arc::new(EmbeddedAuthority::open(&temp.path().join("authority.redb")).unwrap());
        let engine = Arc::new(AccessControlEngine::new(
            authority,
            AccessLog::load(store.clone()).unwrap(),
        ));
        let privacy = Arc::new(PrivacyRetentionManager::new(engine.clone(), store));
        (temp, engine, privacy)
    }

    #[tokio::test]
    async fn runs_once_per_cadence() {
        let (_temp, engine, privacy) = setup().await;
        engine.record_access(
            AccessLogEntry::new("p1", "OLD", "r").at(Utc::now() - ChronoDuration::days(400)),
        );

        let mut sweeper = RetentionSweeper::new(privacy);
        assert!(sweeper.sweep_step().await);
        assert!(engine.access_log().is_empty());
        // Not due again for another cleanup interval.
        assert!(!sweeper.sweep_step().await);
    }

    #[tokio::test]
    async fn respects_disabled_auto_cleanup() {
        let (_temp, engine, privacy) = setup().await;
        engine
            .authority()
            .put_retention_policy(RetentionPolicy {
                auto_cleanup: false,
                ..Default::default()
            })
            .await
            .unwrap();
        engine.record_access(
            AccessLogEntry::new("p1", "OLD", "r").at(Utc::now() - ChronoDuration::days(400)),
        );

        let mut sweeper = RetentionSweeper::new(privacy);
        assert!(!sweeper.sweep_step().await);
        assert_eq!(engine.access_log().len(), 1);
    }

    #[tokio::test]
    async fn stops_on_cancellation() {
        let (_temp, _engine, privacy) = setup().await;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            RetentionSweeper::new(privacy)
                .with_check_interval(Duration::from_secs(3600))
                .run(shutdown.clone()),
        );
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
