// src/limiter/tiered.rs

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::admission_event;
use crate::error::{GateError, Result};
use crate::fingerprint::Fingerprint;
use crate::keys::KeyClass;
use crate::limiter::FixedWindowCounter;
use crate::storage::CounterStore;
use crate::tier::{SubscriptionTier, TierTable};

pub const PROJECT_NAMESPACE: &str = "ratelimit:project";

/// Per-project request limiter with the cap taken from the tier table
#[derive(Debug)]
pub struct TieredRateLimiter<S>
where
    S: CounterStore,
{
    storage: Arc<S>,
    tiers: TierTable,
    window: Duration,
}

impl<S> TieredRateLimiter<S>
where
    S: CounterStore,
{
    pub fn new(storage: Arc<S>, tiers: TierTable, window: Duration) -> Self {
        Self {
            storage,
            tiers,
            window,
        }
    }

    /// Counter id for a project. Public keys ship inside client code, so each
    /// fingerprint gets its own budget on that path.
    pub fn counter_id(project_id: Uuid, class: KeyClass, fingerprint: &Fingerprint) -> String {
        match class {
            KeyClass::Secret => project_id.to_string(),
            KeyClass::Public => format!("{}:{}", project_id, fingerprint),
        }
    }

    /// Counts one request for the project. Unbounded tiers never touch the store.
    pub async fn check(
        &self,
        project_id: Uuid,
        tier: SubscriptionTier,
        class: KeyClass,
        fingerprint: &Fingerprint,
    ) -> Result<()> {
        let Some(limit) = self.tiers.limits(tier).requests_per_minute else {
            return Ok(());
        };

        let id = Self::counter_id(project_id, class, fingerprint);
        let counter = FixedWindowCounter::new(
            Arc::clone(&self.storage),
            PROJECT_NAMESPACE,
            limit,
            self.window,
        );

        match counter.check_and_record(&id).await {
            Ok(status) if status.allowed => Ok(()),
            Ok(status) => {
                admission_event!(tier.as_str(), &id, false, status.count, status.limit);
                Err(GateError::RateLimited(format!(
                    "project {} ({} tier) made {} requests, limit {} per {:?}",
                    project_id, tier, status.count, status.limit, self.window
                )))
            }
            Err(e) => {
                warn!(project_id = %project_id, error = %e, "Project counter unavailable, failing open");
                Ok(())
            }
        }
    }
}
