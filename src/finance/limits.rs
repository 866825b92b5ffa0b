// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-parent spending limits and the usage counters they are checked
//! against. Both are sealed records keyed by parent id.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::LimitViolation;

pub const DEFAULT_MAX_DAILY_AMOUNT: u64 = 10_000;
pub const DEFAULT_MAX_TRANSACTION_AMOUNT: u64 = 5_000;
pub const DEFAULT_MAX_MONTHLY_AMOUNT: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FinancialLimits {
    pub max_daily_amount: u64,
    pub max_transaction_amount: u64,
    pub max_monthly_amount: u64,
}

impl Default for FinancialLimits {
    fn default() -> Self {
        Self {
            max_daily_amount: DEFAULT_MAX_DAILY_AMOUNT,
            max_transaction_amount: DEFAULT_MAX_TRANSACTION_AMOUNT,
            max_monthly_amount: DEFAULT_MAX_MONTHLY_AMOUNT,
        }
    }
}

impl FinancialLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_transaction_amount == 0 {
            return Err("max_transaction_amount must be positive".into());
        }
        if self.max_transaction_amount > self.max_daily_amount {
            return Err("max_transaction_amount cannot exceed max_daily_amount".into());
        }
        if self.max_daily_amount > self.max_monthly_amount {
            return Err("max_daily_amount cannot exceed max_monthly_amount".into());
        }
        Ok(())
    }
}

/// Amounts reserved by non-rejected transactions in the current day and month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UsageCounter {
    pub day: NaiveDate,
    pub daily_total: u64,
    pub transactions_today: u32,
    /// First day of the month `monthly_total` covers.
    pub month: NaiveDate,
    pub monthly_total: u64,
}

fn month_of(day: NaiveDate) -> NaiveDate {
    day - Days::new(u64::from(day.day0()))
}

impl UsageCounter {
    pub fn starting(now: DateTime<Utc>) -> Self {
        let day = now.date_naive();
        Self {
            day,
            daily_total: 0,
            transactions_today: 0,
            month: month_of(day),
            monthly_total: 0,
        }
    }

    /// Zero the day or month totals once `now` has moved past them.
    pub fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != today {
            self.day = today;
            self.daily_total = 0;
            self.transactions_today = 0;
        }
        let month = month_of(today);
        if self.month != month {
            self.month = month;
            self.monthly_total = 0;
        }
    }

    /// First limit `amount` would break, checked per transaction, then
    /// daily, then monthly. Call `roll` first.
    pub fn check(&self, limits: &FinancialLimits, amount: u64) -> Result<(), LimitViolation> {
        if amount > limits.max_transaction_amount {
            return Err(LimitViolation::Transaction {
                limit: limits.max_transaction_amount,
                requested: amount,
            });
        }
        if self.daily_total.saturating_add(amount) > limits.max_daily_amount {
            return Err(LimitViolation::Daily {
                limit: limits.max_daily_amount,
                used: self.daily_total,
                requested: amount,
            });
        }
        if self.monthly_total.saturating_add(amount) > limits.max_monthly_amount {
            return Err(LimitViolation::Monthly {
                limit: limits.max_monthly_amount,
                used: self.monthly_total,
                requested: amount,
            });
        }
        Ok(())
    }

    pub fn reserve(&mut self, amount: u64) {
        self.daily_total = self.daily_total.saturating_add(amount);
        self.monthly_total = self.monthly_total.saturating_add(amount);
        self.transactions_today = self.transactions_today.saturating_add(1);
    }

    /// Give back a reservation made at `created_at`. Amounts from an earlier
    /// day or month were already reset and are left alone.
    pub fn release(&mut self, amount: u64, created_at: DateTime<Utc>) {
        if created_at.date_naive() == self.day {
            self.daily_total = self.daily_total.saturating_sub(amount);
        }
        if month_of(created_at.date_naive()) == self.month {
            self.monthly_total = self.monthly_total.saturating_sub(amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn limits(daily: u64) -> FinancialLimits {
        FinancialLimits {
            max_daily_amount: daily,
            max_transaction_amount: daily,
            max_monthly_amount: daily * 30,
        }
    }

    #[test]
    fn daily_limit_is_inclusive() {
        let mut usage = UsageCounter::starting(at(2026, 3, 10));
        usage.reserve(40);
        assert!(matches!(
            usage.check(&limits(50), 20),
            Err(LimitViolation::Daily {
                limit: 50,
                used: 40,
                requested: 20
            })
        ));
        assert!(usage.check(&limits(50), 10).is_ok());
    }

    #[test]
    fn per_transaction_limit_checked_first() {
        let usage = UsageCounter::starting(at(2026, 3, 10));
        let limits = FinancialLimits {
            max_daily_amount: 100,
            max_transaction_amount: 30,
            max_monthly_amount: 1000,
        };
        assert!(matches!(
            usage.check(&limits, 31),
            Err(LimitViolation::Transaction { .. })
        ));
    }

    #[test]
    fn monthly_limit() {
        let mut usage = UsageCounter::starting(at(2026, 3, 10));
        usage.monthly_total = 990;
        let limits = FinancialLimits {
            max_daily_amount: 100,
            max_transaction_amount: 100,
            max_monthly_amount: 1000,
        };
        assert!(matches!(
            usage.check(&limits, 20),
            Err(LimitViolation::Monthly { used: 990, .. })
        ));
    }

    #[test]
    fn roll_resets_day_then_month() {
        let mut usage = UsageCounter::starting(at(2026, 3, 31));
        usage.reserve(70);

        usage.roll(at(2026, 3, 31));
        assert_eq!(usage.daily_total, 70);

        usage.roll(at(2026, 4, 1));
        assert_eq!(usage.daily_total, 0);
        assert_eq!(usage.transactions_today, 0);
        assert_eq!(usage.monthly_total, 0);
    }

    #[test]
    fn release_only_touches_current_periods() {
        let mut usage = UsageCounter::starting(at(2026, 3, 10));
        usage.reserve(60);
        usage.release(60, at(2026, 3, 10));
        assert_eq!(usage.daily_total, 0);
        assert_eq!(usage.monthly_total, 0);

        usage.reserve(30);
        usage.release(30, at(2026, 3, 9));
        assert_eq!(usage.daily_total, 30);
        assert_eq!(usage.monthly_total, 0);
    }

    #[test]
    fn validate_orders_limits() {
        assert!(FinancialLimits::default().validate().is_ok());
        let bad = FinancialLimits {
            max_daily_amount: 100,
            max_transaction_amount: 200,
            max_monthly_amount: 1000,
        };
        assert!(bad.validate().is_err());
    }
}
