// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of principal snapshots.
//!
//! Advisory only: used for display lookups. Authorization decisions always
//! go to the authority.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use super::Principal;

struct CacheEntry {
    principal: Principal,
    inserted_at: Instant,
}

pub struct PrincipalCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl PrincipalCache {
    /// - `capacity`: max number of principals held.
    /// - `ttl`: time-to-live of each snapshot.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Returns `None` if not cached or expired.
    pub fn get(&self, principal_id: &str) -> Option<Principal> {
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(principal_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.principal.clone());
            }
            cache.pop(principal_id);
        }
        None
    }

    /// Store a snapshot confirmed by the authority.
    pub fn put(&self, principal: Principal) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                principal.id.clone(),
                CacheEntry {
                    principal,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn invalidate(&self, principal_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(principal_id);
        }
    }
}
