//! Counter store abstraction for rate limit bookkeeping.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::trace;

/// Errors raised by counter store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Counter store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Shared key-value store with atomic increment-and-expire.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the current count for a key; absent or expired keys are `None`.
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Atomically increment the key by one and (re)set its expiry to `ttl`.
    ///
    /// Returns the count after the increment.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at: Instant,
}

impl CounterEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local counter store.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: DashMap<String, CounterEntry>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired counter. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let removed = before.saturating_sub(self.entries.len());
        trace!(removed, "Purged expired counters");
        removed
    }

    /// Purge expired counters every `interval` for as long as the store lives.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.purge_expired();
            }
        })
    }

    /// Number of stored counters, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.count))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: now,
        });

        if !entry.is_live(now) {
            entry.count = 0;
        }
        entry.count += 1;
        entry.expires_at = now + ttl;

        Ok(entry.count)
    }
}
