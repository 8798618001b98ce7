//! In-process store for local development and tests.
//!
//! Each key is guarded by its `DashMap` shard lock for the duration of one
//! operation, which gives the same per-key atomicity the Redis scripts give.
//! Expiry is evaluated lazily against the injected [`Clock`]; a sweeper
//! reclaims expired entries nobody touches again.

use super::{record_key, AttachOutcome, SecretStore, StoreResult};
use crate::clock::Clock;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone)]
struct Record {
    /// Empty string while reserved.
    value: String,
    expires_at: Instant,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// `DashMap`-backed [`SecretStore`].
pub struct InMemoryStore {
    records: DashMap<String, Record>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Number of keys held, expired or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.records.len())
    }

    /// Periodically purge expired keys until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, "Swept expired records");
                }
            }
        })
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("records", &self.records.len())
            .field("clock", &self.clock)
            .finish()
    }
}

#[async_trait]
impl SecretStore for InMemoryStore {
    async fn reserve_code(&self, code: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now();
        let fresh = Record {
            value: String::new(),
            expires_at: now + ttl,
        };
        match self.records.entry(record_key(code)) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn attach_payload(
        &self,
        code: &str,
        blob: &str,
        ttl: Duration,
    ) -> StoreResult<AttachOutcome> {
        let now = self.clock.now();
        match self.records.entry(record_key(code)) {
            Entry::Vacant(_) => Ok(AttachOutcome::NotFound),
            Entry::Occupied(entry) if entry.get().is_expired(now) => {
                entry.remove();
                Ok(AttachOutcome::NotFound)
            }
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if !record.value.is_empty() {
                    return Ok(AttachOutcome::Conflict);
                }
                record.value = blob.to_string();
                record.expires_at = now + ttl;
                Ok(AttachOutcome::Attached)
            }
        }
    }

    async fn consume_if_present(&self, code: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        match self.records.entry(record_key(code)) {
            Entry::Vacant(_) => Ok(None),
            Entry::Occupied(entry) if entry.get().is_expired(now) => {
                entry.remove();
                Ok(None)
            }
            Entry::Occupied(entry) => {
                let record = entry.remove();
                Ok((!record.value.is_empty()).then_some(record.value))
            }
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
