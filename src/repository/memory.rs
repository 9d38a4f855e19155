// src/repository/memory.rs

// In-process relational store for tests, the simulator and the bench.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{GateError, Result, StorageError};
use crate::keys::KeyClass;
use crate::repository::{AccessRepository, ApiKeyRecord, ProjectIdentity};
use crate::tier::SubscriptionTier;

#[derive(Debug, Clone)]
struct UserRecord {
    subscription_type: SubscriptionTier,
    status: String,
    role: String,
}

#[derive(Debug, Default)]
struct Tables {
    keys: Vec<ApiKeyRecord>,
    // project id -> owning user id
    projects: HashMap<Uuid, Uuid>,
    users: HashMap<Uuid, UserRecord>,
    events: HashMap<Uuid, Vec<DateTime<Utc>>>,
}

/// Relational store double with call counters and fault injection
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    lookup_calls: AtomicUsize,
    count_calls: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_counts: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a user owning a new project and returns the project id
    pub fn add_project(&self, tier: SubscriptionTier) -> Uuid {
        let user_id = Uuid::new_v4();
        let project_id = Uuid::new_v4();

        let mut tables = self.tables();
        tables.users.insert(
            user_id,
            UserRecord {
                subscription_type: tier,
                status: "active".to_string(),
                role: "owner".to_string(),
            },
        );
        tables.projects.insert(project_id, user_id);
        project_id
    }

    /// Issues a key of `class` for an existing project
    pub fn issue_key(&self, project_id: Uuid, class: KeyClass, key: &str) {
        self.tables().keys.push(ApiKeyRecord {
            key: key.to_string(),
            class,
            project_id,
            revoked: false,
        });
    }

    /// Marks a key revoked. Returns false if it was never issued.
    pub fn revoke_key(&self, class: KeyClass, key: &str) -> bool {
        let mut tables = self.tables();
        match tables
            .keys
            .iter_mut()
            .find(|record| record.class == class && record.key == key)
        {
            Some(record) => {
                record.revoked = true;
                true
            }
            None => false,
        }
    }

    /// Records `count` events for the project at `at`
    pub fn record_events(&self, project_id: Uuid, count: usize, at: DateTime<Utc>) {
        self.tables()
            .events
            .entry(project_id)
            .or_default()
            .extend(std::iter::repeat(at).take(count));
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_counts(&self, fail: bool) {
        self.fail_counts.store(fail, Ordering::SeqCst);
    }

    /// Number of `find_active_binding` calls so far
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Number of `count_events_since` calls so far
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessRepository for MemoryRepository {
    async fn find_active_binding(
        &self,
        class: KeyClass,
        key: &str,
    ) -> Result<Option<ProjectIdentity>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(GateError::Store(StorageError::Database(
                "connection refused".to_string(),
            )));
        }

        let tables = self.tables();
        let identity = tables
            .keys
            .iter()
            .filter(|record| record.class == class && record.key == key && !record.revoked)
            .find_map(|record| {
                let user_id = *tables.projects.get(&record.project_id)?;
                let user = tables.users.get(&user_id)?;
                Some(ProjectIdentity {
                    project_id: record.project_id,
                    user_id,
                    subscription_type: user.subscription_type,
                    user_status: user.status.clone(),
                    user_role: user.role.clone(),
                })
            });

        Ok(identity)
    }

    async fn count_events_since(&self, project_id: Uuid, since: DateTime<Utc>) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(GateError::Store(StorageError::Database(
                "statement timeout".to_string(),
            )));
        }

        let tables = self.tables();
        let count = tables
            .events
            .get(&project_id)
            .map_or(0, |events| events.iter().filter(|at| **at >= since).count());

        Ok(count as u64)
    }
}
