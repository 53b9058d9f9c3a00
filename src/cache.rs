//! TTL cache for aggregated news responses.
//!
//! [`CacheStore`] is the contract the aggregator depends on. Entries are
//! replaced wholesale on every write and never returned once expired.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::article::NewsResponse;
use crate::error::CacheError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub response: NewsResponse,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(response: NewsResponse, ttl: Duration) -> Self {
        let cached_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            response,
            cached_at,
            expires_at: cached_at + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Entry for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store `response` under `key` for `ttl`, replacing any previous entry.
    async fn set(&self, key: &str, response: NewsResponse, ttl: Duration) -> Result<(), CacheError>;

    /// Drop every expired entry. Returns the number removed.
    async fn purge_expired(&self) -> Result<u64, CacheError>;
}

struct Slot {
    entry: CacheEntry,
    /// `None` when the TTL overflows the clock.
    deadline: Option<Instant>,
}

/// Process-local cache backed by a map behind an async lock.
///
/// Expiry is tracked on the tokio clock so tests can drive it with paused time.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Slot>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Slot {
    fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(slot) if !slot.is_expired_at(Instant::now()) => {
                    return Ok(Some(slot.entry.clone()))
                }
                Some(_) => {}
            }
        }

        // Stale: evict unless a fresh write landed in between
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|slot| slot.is_expired_at(Instant::now()))
        {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, response: NewsResponse, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let slot = Slot {
            entry: CacheEntry::new(response, ttl),
            deadline: now.checked_add(ttl),
        };

        let mut entries = self.entries.write().await;
        entries.retain(|_, slot| !slot.is_expired_at(now));
        entries.insert(key.to_string(), slot);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, slot| !slot.is_expired_at(now));
        Ok((before - entries.len()) as u64)
    }
}
