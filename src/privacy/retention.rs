// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Retention windows per log category.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Category of an audit or data-access log entry. Drives its retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogCategory {
    Login,
    Task,
    Achievement,
    Financial,
    General,
}

impl LogCategory {
    pub const ALL: [LogCategory; 5] = [
        LogCategory::Login,
        LogCategory::Task,
        LogCategory::Achievement,
        LogCategory::Financial,
        LogCategory::General,
    ];
}

/// Retention windows in days plus the auto-cleanup schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RetentionPolicy {
    pub login_logs_days: u32,
    pub task_logs_days: u32,
    pub achievement_logs_days: u32,
    pub financial_logs_days: u32,
    pub general_logs_days: u32,
    pub auto_cleanup: bool,
    pub cleanup_interval_hours: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            login_logs_days: 90,
            task_logs_days: 180,
            achievement_logs_days: 365,
            // Financial records are kept five years.
            financial_logs_days: 1825,
            general_logs_days: 30,
            auto_cleanup: true,
            cleanup_interval_hours: 24,
        }
    }
}

impl RetentionPolicy {
    pub fn days(&self, category: LogCategory) -> u32 {
        match category {
            LogCategory::Login => self.login_logs_days,
            LogCategory::Task => self.task_logs_days,
            LogCategory::Achievement => self.achievement_logs_days,
            LogCategory::Financial => self.financial_logs_days,
            LogCategory::General => self.general_logs_days,
        }
    }

    /// Entries strictly older than this instant are expired.
    pub fn cutoff(&self, category: LogCategory, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.days(category)))
    }

    pub fn is_expired(
        &self,
        category: LogCategory,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        timestamp < self.cutoff(category, now)
    }

    pub fn validate(&self) -> Result<(), String> {
        for category in LogCategory::ALL {
            if self.days(category) == 0 {
                return Err(format!("{category:?} retention must be at least one day"));
            }
        }
        if self.cleanup_interval_hours == 0 {
            return Err("cleanup interval must be at least one hour".to_string());
        }
        Ok(())
    }
}
