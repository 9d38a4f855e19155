// src/limiter/mod.rs

pub mod abuse;
pub mod tiered;

#[cfg(test)]
mod tests;

pub use abuse::AbuseLimiter;
pub use tiered::TieredRateLimiter;

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::storage::{decode_counter, namespaced, CounterStore};

/// Status returned by a counted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether the request was allowed
    pub allowed: bool,

    /// Requests counted in the current window, this one included
    pub count: u64,

    /// Maximum requests admitted per window
    pub limit: u64,

    /// Upper bound on the time until the window resets
    pub reset_after: Duration,
}

impl RateLimitStatus {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// Fixed window counter over a shared store.
///
/// The first increment in a window creates the counter with a TTL of one
/// window; later increments never extend it, so the whole counter resets when
/// the TTL lapses. The `limit`-th request is admitted, the next one is not.
#[derive(Debug)]
pub struct FixedWindowCounter<S>
where
    S: CounterStore,
{
    storage: Arc<S>,
    namespace: &'static str,
    limit: u64,
    window: Duration,
}

impl<S> FixedWindowCounter<S>
where
    S: CounterStore,
{
    pub fn new(storage: Arc<S>, namespace: &'static str, limit: u64, window: Duration) -> Self {
        Self {
            storage,
            namespace,
            limit,
            window,
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Store key for `id`
    pub fn key(&self, id: &str) -> String {
        namespaced(self.namespace, id)
    }

    /// Counts one request against `id` and reports whether it fits the window
    pub async fn check_and_record(&self, id: &str) -> Result<RateLimitStatus> {
        let count = self
            .storage
            .increment_with_expiry(&self.key(id), 1, self.window)
            .await?;
        let count = u64::try_from(count).unwrap_or(0);

        Ok(RateLimitStatus {
            allowed: count <= self.limit,
            count,
            limit: self.limit,
            reset_after: self.window,
        })
    }

    /// Current count for `id` without recording anything
    pub async fn peek(&self, id: &str) -> Result<u64> {
        let count = self
            .storage
            .get(&self.key(id))
            .await?
            .as_deref()
            .and_then(decode_counter)
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Drops the counter for `id`, opening a fresh window
    pub async fn reset(&self, id: &str) -> Result<()> {
        self.storage.delete(&self.key(id)).await?;
        Ok(())
    }
}
