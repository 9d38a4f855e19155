// src/repository/mod.rs

//! Read-only access to the relational store: key bindings and event counts.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::keys::KeyClass;
use crate::tier::SubscriptionTier;

/// An issued API key. Only `revoked` ever changes after issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub key: String,
    pub class: KeyClass,
    pub project_id: Uuid,
    pub revoked: bool,
}

/// Identity fields of an active key → project → user binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentity {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub subscription_type: SubscriptionTier,
    pub user_status: String,
    pub user_role: String,
}

#[async_trait]
pub trait AccessRepository: Send + Sync {
    /// Joins key, project and owning user, ignoring revoked keys.
    ///
    /// Unknown and revoked keys both come back as `Ok(None)`.
    async fn find_active_binding(
        &self,
        class: KeyClass,
        key: &str,
    ) -> Result<Option<ProjectIdentity>>;

    /// Number of events recorded for the project at or after `since`
    async fn count_events_since(&self, project_id: Uuid, since: DateTime<Utc>) -> Result<u64>;
}
