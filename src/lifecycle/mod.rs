//! Code/secret lifecycle.
//!
//! Per code:
//!
//! ```text
//! Absent --reserve--> Reserved-empty --attach--> Populated --consume--> Absent
//! Reserved-empty --TTL or consume--> Absent
//! Populated      --TTL--> Absent
//! ```
//!
//! Attaching to a populated code reports a conflict and leaves it alone;
//! attaching to or consuming an absent code reports not-found. All
//! coordination between concurrent callers happens inside the store's atomic
//! operations; nothing here locks.

pub mod code;
pub mod payload;

pub use code::Code;
pub use payload::{Ciphertext, PayloadError};

use crate::config::SecretsConfig;
use crate::error::{AppError, AppResult};
use crate::store::{AttachOutcome, SharedStore};
use rand::rngs::OsRng;
use tracing::{debug, warn};

/// Result of a retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// The stored ciphertext. The record no longer exists.
    Secret(String),
    /// Never existed, expired, already consumed, or not yet attached.
    /// Deliberately indistinguishable.
    NotFound,
}

/// Backend liveness as reported by the health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Ok,
    Degraded,
}

impl Health {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Sequences store primitives into the reservation, attachment and burn
/// protocols.
pub struct Lifecycle {
    store: SharedStore,
    config: SecretsConfig,
}

impl Lifecycle {
    pub fn new(store: SharedStore, config: SecretsConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SecretsConfig {
        &self.config
    }

    /// Reserve a fresh code with the placeholder TTL.
    ///
    /// Collisions are retried with a new candidate, up to
    /// `max_reserve_attempts` times.
    pub async fn request_new_code(&self) -> AppResult<Code> {
        let ttl = self.config.placeholder_ttl();
        let attempts = self.config.max_reserve_attempts.max(1);

        for attempt in 1..=attempts {
            let candidate = Code::generate(&mut OsRng, self.config.code_length);
            if self.store.reserve_code(candidate.as_str(), ttl).await? {
                return Ok(candidate);
            }
            debug!(attempt, "Code collision, drawing another");
        }

        warn!(attempts, "Gave up reserving a code");
        Err(AppError::CodeSpaceExhausted { attempts })
    }

    /// Attach ciphertext to a reserved code, resetting its TTL to the
    /// message TTL.
    pub async fn attach_secret(&self, code: &str, blob: &Ciphertext) -> AppResult<AttachOutcome> {
        let Some(code) = Code::parse(code, self.config.code_length) else {
            return Ok(AttachOutcome::NotFound);
        };

        let outcome = self
            .store
            .attach_payload(code.as_str(), blob.as_str(), self.config.message_ttl())
            .await?;
        Ok(outcome)
    }

    /// Fetch the ciphertext and destroy the record in the same step.
    pub async fn retrieve_secret(&self, code: &str) -> AppResult<Retrieval> {
        let Some(code) = Code::parse(code, self.config.code_length) else {
            return Ok(Retrieval::NotFound);
        };

        match self.store.consume_if_present(code.as_str()).await? {
            Some(blob) => Ok(Retrieval::Secret(blob)),
            None => Ok(Retrieval::NotFound),
        }
    }

    /// Reflects only whether the store answers a ping.
    pub async fn health_check(&self) -> Health {
        match self.store.ping().await {
            Ok(()) => Health::Ok,
            Err(e) => {
                warn!("Store ping failed: {}", e);
                Health::Degraded
            }
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
