//! Atomic key store backing the code/secret lifecycle.
//!
//! Every code lives under a single key (`msg:<code>`) whose value is either
//! the empty sentinel (reserved, nothing attached yet) or the ciphertext.
//! Each trait method is one indivisible step on the backend, so among any
//! number of concurrent callers racing on the same key exactly one observes
//! success:
//!
//! - [`SecretStore::reserve_code`] creates the key only if it is absent.
//! - [`SecretStore::attach_payload`] fills the key only if it holds the
//!   empty sentinel, and resets its TTL.
//! - [`SecretStore::consume_if_present`] deletes the key and returns its
//!   payload, if any.
//!
//! Backends must never emulate these with separate read and write calls.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;

use crate::clock::SystemClock;
use crate::config::{StoreBackend, StoreConfig};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Namespace prefix for every record key.
pub const KEY_PREFIX: &str = "msg:";

/// Key under which a code's record is stored.
pub fn record_key(code: &str) -> String {
    format!("{KEY_PREFIX}{code}")
}

/// Result of trying to populate a reserved code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The reservation was empty and now holds the payload.
    Attached,
    /// Someone already attached a payload to this code.
    Conflict,
    /// The code was never reserved, has expired, or has been consumed.
    NotFound,
}

/// Backend failures. Expected state-machine outcomes are not errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected reply from store: {0}")]
    UnexpectedReply(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The atomic primitives the lifecycle engine is built on.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create the key with the empty sentinel and `ttl`, only if absent.
    ///
    /// Returns `false` on collision; the caller retries with a new code.
    async fn reserve_code(&self, code: &str, ttl: Duration) -> StoreResult<bool>;

    /// Replace the empty sentinel with `blob` and reset the TTL to `ttl`.
    async fn attach_payload(&self, code: &str, blob: &str, ttl: Duration)
        -> StoreResult<AttachOutcome>;

    /// Fetch and delete the key in one step.
    ///
    /// Returns `None` when the key is absent or
    /// still held the empty sentinel; the reservation is gone either way.
    async fn consume_if_present(&self, code: &str) -> StoreResult<Option<String>>;

    /// Liveness probe.
    async fn ping(&self) -> StoreResult<()>;
}

/// Shared store handle used across the application.
pub type SharedStore = Arc<dyn SecretStore>;

/// TTL in whole milliseconds, never below one.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Build the configured backend.
pub async fn connect(config: &StoreConfig) -> StoreResult<SharedStore> {
    match config.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.redis).await?;
            info!("Connected to Redis store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryStore::new(Arc::new(SystemClock)));
            store.spawn_sweeper(Duration::from_secs(config.memory_sweep_secs.max(1)));
            info!("Using in-process memory store (single node only)");
            Ok(store)
        }
    }
}
