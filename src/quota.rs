// src/quota.rs

//! Monthly event quota, read through a short-lived cache in the counter store.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{GateError, Result};
use crate::repository::{AccessRepository, ProjectIdentity};
use crate::storage::{namespaced, CounterStore};
use crate::tier::TierTable;

pub const QUOTA_NAMESPACE: &str = "project_events";

/// Cached copy of a project's event count for one calendar month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCacheEntry {
    pub project_id: Uuid,
    pub month: String,
    pub count: u64,
    pub computed_at: DateTime<Utc>,
}

/// First instant of the UTC calendar month containing `now`
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Store key of the cached count, `project_events:events:<project>:<YYYY-MM>`
pub fn cache_key(project_id: Uuid, now: DateTime<Utc>) -> String {
    namespaced(
        QUOTA_NAMESPACE,
        &format!("events:{}:{}", project_id, now.format("%Y-%m")),
    )
}

#[derive(Debug)]
pub struct QuotaTracker<S, R>
where
    S: CounterStore,
    R: AccessRepository,
{
    cache: Arc<S>,
    repository: Arc<R>,
    tiers: TierTable,
    ttl: Duration,
}

impl<S, R> QuotaTracker<S, R>
where
    S: CounterStore,
    R: AccessRepository,
{
    pub fn new(cache: Arc<S>, repository: Arc<R>, tiers: TierTable, ttl: Duration) -> Self {
        Self {
            cache,
            repository,
            tiers,
            ttl,
        }
    }

    /// Event count for the project's current month, cache-aside.
    ///
    /// A cached value is served until its TTL lapses, so the result can lag the
    /// relational store by at most one TTL. Concurrent misses may each recount
    /// and overwrite the entry; the writes are idempotent.
    ///
    /// Cache faults degrade to a recount. A failed recount is returned as a
    /// store error.
    pub async fn cached_event_count(&self, project_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let key = cache_key(project_id, now);

        match self.read_cached(&key).await {
            Some(entry) => {
                debug!(project_id = %project_id, count = entry.count, "Quota cache hit");
                return Ok(entry.count);
            }
            None => debug!(project_id = %project_id, "Quota cache miss"),
        }

        let since = month_start(now);
        let count = self
            .repository
            .count_events_since(project_id, since)
            .await
            .map_err(|e| {
                error!(project_id = %project_id, error = %e, "Event recount failed");
                e
            })?;

        let entry = QuotaCacheEntry {
            project_id,
            month: now.format("%Y-%m").to_string(),
            count,
            computed_at: now,
        };
        self.write_cached(&key, &entry).await;

        Ok(count)
    }

    /// Rejects the project once its monthly count is above the tier ceiling.
    ///
    /// Returns the count so the caller can expose it downstream.
    pub async fn check(&self, identity: &ProjectIdentity, now: DateTime<Utc>) -> Result<u64> {
        let count = self.cached_event_count(identity.project_id, now).await?;

        if let Some(ceiling) = self.tiers.limits(identity.subscription_type).monthly_events {
            if count > ceiling {
                return Err(GateError::QuotaExceeded(format!(
                    "project {} has {} events this month, ceiling {}",
                    identity.project_id, count, ceiling
                )));
            }
        }

        Ok(count)
    }

    /// Drops the cached count so the next check recounts
    pub async fn invalidate(&self, project_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.cache.delete(&cache_key(project_id, now)).await
    }

    async fn read_cached(&self, key: &str) -> Option<QuotaCacheEntry> {
        let bytes = match self.cache.get(key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(key, error = %e, "Quota cache read failed, recounting");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable quota cache entry");
                None
            }
        }
    }

    async fn write_cached(&self, key: &str, entry: &QuotaCacheEntry) {
        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode quota cache entry");
                return;
            }
        };

        if let Err(e) = self.cache.set(key, &bytes, Some(self.ttl)).await {
            warn!(key, error = %e, "Quota cache write failed");
        }
    }
}
