//! Token-bucket admission control.
//!
//! The bucket is a semaphore whose permits are tokens. Admitting a request
//! takes one permit and forgets it; a background task adds one permit per
//! refill tick until the bucket is back at its burst capacity. Without a
//! configured rate every request is admitted.

use crate::config::RateLimitConfig;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub struct AdmissionController {
    bucket: Option<TokenBucket>,
}

struct TokenBucket {
    tokens: Arc<Semaphore>,
    capacity: usize,
    refill: JoinHandle<()>,
}

impl AdmissionController {
    /// Build the controller and, when a rate is configured, start its refill
    /// task. Must be called from within a Tokio runtime.
    pub fn new(config: &RateLimitConfig) -> Self {
        if config.rps == 0 {
            return Self::disabled();
        }

        let capacity = config.effective_burst() as usize;
        let tokens = Arc::new(Semaphore::new(capacity));
        let period = refill_period(config.rps);
        let refill = tokio::spawn(refill_loop(Arc::downgrade(&tokens), capacity, period));
        debug!(rps = config.rps, burst = capacity, "Admission control enabled");

        Self {
            bucket: Some(TokenBucket {
                tokens,
                capacity,
                refill,
            }),
        }
    }

    /// Controller that admits everything.
    pub fn disabled() -> Self {
        Self { bucket: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    /// Take a token if one is available. Never waits.
    pub fn try_admit(&self) -> bool {
        let Some(bucket) = &self.bucket else {
            return true;
        };
        match bucket.tokens.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Tokens currently available, `None` when disabled.
    pub fn available(&self) -> Option<usize> {
        self.bucket.as_ref().map(|b| b.tokens.available_permits())
    }

    pub fn capacity(&self) -> Option<usize> {
        self.bucket.as_ref().map(|b| b.capacity)
    }
}

impl Drop for AdmissionController {
    fn drop(&mut self) {
        if let Some(bucket) = &self.bucket {
            bucket.refill.abort();
        }
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// One token per `1s / rps`, never shorter than a nanosecond.
fn refill_period(rps: u32) -> Duration {
    (Duration::from_secs(1) / rps).max(Duration::from_nanos(1))
}

// Only this task adds permits, so the check-then-add cannot overshoot the
// capacity; concurrent admissions can only lower the count in between.
async fn refill_loop(tokens: Weak<Semaphore>, capacity: usize, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately and the bucket starts full.
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(tokens) = tokens.upgrade() else {
            break;
        };
        if tokens.available_permits() < capacity {
            tokens.add_permits(1);
        }
    }
}
