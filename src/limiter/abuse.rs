// src/limiter/abuse.rs

use std::sync::Arc;
use tracing::{debug, warn};

use crate::admission_event;
use crate::config::AbuseConfig;
use crate::error::{GateError, Result};
use crate::fingerprint::Fingerprint;
use crate::limiter::FixedWindowCounter;
use crate::storage::CounterStore;

pub const GLOBAL_NAMESPACE: &str = "ratelimit:global";
pub const INVALID_ATTEMPT_NAMESPACE: &str = "security:invalidkey";

/// Per-fingerprint counters that run before any key is trusted.
///
/// Both counters fail open: a store error is logged and the request goes on.
#[derive(Debug)]
pub struct AbuseLimiter<S>
where
    S: CounterStore,
{
    global: FixedWindowCounter<S>,
    invalid_attempts: FixedWindowCounter<S>,
}

impl<S> AbuseLimiter<S>
where
    S: CounterStore,
{
    pub fn new(storage: Arc<S>, config: &AbuseConfig) -> Self {
        Self {
            global: FixedWindowCounter::new(
                Arc::clone(&storage),
                GLOBAL_NAMESPACE,
                config.global_limit,
                config.global_window,
            ),
            invalid_attempts: FixedWindowCounter::new(
                storage,
                INVALID_ATTEMPT_NAMESPACE,
                config.invalid_attempt_limit,
                config.invalid_attempt_window,
            ),
        }
    }

    /// Counts a request from `fingerprint`, whatever its eventual outcome
    pub async fn record_request(&self, fingerprint: &Fingerprint) -> Result<()> {
        match self.global.check_and_record(fingerprint.as_str()).await {
            Ok(status) if status.allowed => Ok(()),
            Ok(status) => {
                admission_event!("global", fingerprint.as_str(), false, status.count, status.limit);
                Err(GateError::GlobalRateLimited(format!(
                    "{} requests from {} in the current window, limit {}",
                    status.count, fingerprint, status.limit
                )))
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Global counter unavailable, failing open");
                Ok(())
            }
        }
    }

    /// Counts a failed format check or resolution and blocks once the
    /// threshold is exceeded
    pub async fn record_invalid_attempt(&self, fingerprint: &Fingerprint) -> Result<()> {
        match self.invalid_attempts.check_and_record(fingerprint.as_str()).await {
            Ok(status) if status.allowed => {
                debug!(fingerprint = %fingerprint, attempts = status.count, "Invalid key attempt recorded");
                Ok(())
            }
            Ok(status) => {
                admission_event!("invalid_key", fingerprint.as_str(), false, status.count, status.limit);
                Err(self.too_many_attempts(fingerprint, status.count))
            }
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Invalid-attempt counter unavailable, failing open");
                Ok(())
            }
        }
    }

    /// Rejects a fingerprint already over the invalid-attempt threshold
    /// without counting this request
    pub async fn check_invalid_attempts(&self, fingerprint: &Fingerprint) -> Result<()> {
        match self.invalid_attempts.peek(fingerprint.as_str()).await {
            Ok(count) if count > self.invalid_attempts.limit() => {
                Err(self.too_many_attempts(fingerprint, count))
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "Invalid-attempt counter unavailable, failing open");
                Ok(())
            }
        }
    }

    fn too_many_attempts(&self, fingerprint: &Fingerprint, count: u64) -> GateError {
        GateError::TooManyAttempts(format!(
            "{} invalid key attempts from {} within {:?}",
            count,
            fingerprint,
            self.invalid_attempts.window()
        ))
    }
}
