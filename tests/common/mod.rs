//! Store doubles and helpers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use burnbox::clock::ManualClock;
use burnbox::store::{AttachOutcome, InMemoryStore, SecretStore, StoreError, StoreResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps the memory store and counts every call that reaches it.
pub struct CountingStore {
    inner: InMemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            inner: InMemoryStore::new(clock),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SecretStore for CountingStore {
    async fn reserve_code(&self, code: &str, ttl: Duration) -> StoreResult<bool> {
        self.record();
        self.inner.reserve_code(code, ttl).await
    }

    async fn attach_payload(
        &self,
        code: &str,
        blob: &str,
        ttl: Duration,
    ) -> StoreResult<AttachOutcome> {
        self.record();
        self.inner.attach_payload(code, blob, ttl).await
    }

    async fn consume_if_present(&self, code: &str) -> StoreResult<Option<String>> {
        self.record();
        self.inner.consume_if_present(code).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.record();
        self.inner.ping().await
    }
}

/// Every call fails as if the backend were unreachable.
pub struct FailingStore;

#[async_trait]
impl SecretStore for FailingStore {
    async fn reserve_code(&self, _code: &str, _ttl: Duration) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn attach_payload(
        &self,
        _code: &str,
        _blob: &str,
        _ttl: Duration,
    ) -> StoreResult<AttachOutcome> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn consume_if_present(&self, _code: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Base64 body with a 12-byte nonce followed by `payload`.
pub fn sealed_body(payload: &[u8]) -> String {
    let mut raw = vec![0u8; 12];
    raw.extend_from_slice(payload);
    BASE64.encode(raw)
}
