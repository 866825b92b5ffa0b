// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded per-principal record of who touched which data and why.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{LogCategory, RetentionPolicy};

/// Oldest entries are evicted first past this many.
pub const DATA_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DataAccessLog {
    pub log_id: String,
    /// Whose data was accessed.
    pub principal_id: String,
    /// Who accessed it.
    pub accessor_id: String,
    pub category: LogCategory,
    pub action: String,
    pub data_type: String,
    pub purpose: String,
    pub timestamp: DateTime<Utc>,
}

impl DataAccessLog {
    pub fn new(
        principal_id: impl Into<String>,
        accessor_id: impl Into<String>,
        category: LogCategory,
        action: impl Into<String>,
    ) -> Self {
        Self {
            log_id: uuid::Uuid::new_v4().to_string(),
            principal_id: principal_id.into(),
            accessor_id: accessor_id.into(),
            category,
            action: action.into(),
            data_type: String::new(),
            purpose: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// FIFO ring of at most [`DATA_LOG_CAPACITY`] entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataLogRing {
    entries: VecDeque<DataAccessLog>,
}

impl DataLogRing {
    pub fn push(&mut self, entry: DataAccessLog) {
        self.entries.push_back(entry);
        while self.entries.len() > DATA_LOG_CAPACITY {
            self.entries.pop_front();
        }
    }

    /// Drop expired entries; returns how many went.
    pub fn expire(&mut self, policy: &RetentionPolicy, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !policy.is_expired(e.category, e.timestamp, now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataAccessLog> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<DataAccessLog> {
        self.entries.into()
    }
}
