// src/test_utils.rs

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{GateConfig, InMemoryConfig};
use crate::error::{GateError, Result, StorageError};
use crate::fingerprint::{ClientMeta, HEADER_PUBLIC_KEY, HEADER_SECRET_KEY, HEADER_USER_AGENT};
use crate::keys::KeyClass;
use crate::pipeline::{AdmissionPipeline, AdmissionRequest};
use crate::repository::MemoryRepository;
use crate::storage::{CounterStore, MemoryStorage};
use crate::tier::SubscriptionTier;

/// Counter store wrapper that can be switched into a failing state
#[derive(Debug)]
pub struct MockStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            inner: MemoryStorage::new(InMemoryConfig {
                max_entries: 100_000,
                use_background_task: false,
                cleanup_interval: Duration::from_secs(60),
            }),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent call fail with a timeout
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of calls made against the store, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, operation: &str, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GateError::Store(StorageError::Timeout(format!(
                "mock {} on {} timed out",
                operation, key
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MockStorage {
    type Config = ();

    async fn new(_config: Self::Config) -> Result<Self> {
        Ok(Self::new())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.enter("GET", key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.enter("SET", key)?;
        self.inner.set(key, value, ttl).await
    }

    async fn increment_with_expiry(&self, key: &str, amount: i64, ttl: Duration) -> Result<i64> {
        self.enter("INCRBY", key)?;
        self.inner.increment_with_expiry(key, amount, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.enter("EXISTS", key)?;
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.enter("DEL", key)?;
        self.inner.delete(key).await
    }
}

/// A well-formed public key derived from `seed`
pub fn public_key(seed: u64) -> String {
    format!("supm_{:032x}", seed)
}

/// A well-formed secret key derived from `seed`
pub fn secret_key(seed: u64) -> String {
    format!("sk_{:064x}", seed)
}

/// Client metadata for a fixed user agent at `addr`
pub fn client(addr: &str) -> ClientMeta {
    ClientMeta::new(addr, "Mozilla/5.0 (X11; Linux x86_64) gate-test")
}

pub fn request(class: KeyClass, key: &str, client: ClientMeta) -> AdmissionRequest {
    AdmissionRequest::new(class, key, client)
}

/// Builds a request the way a handler would, from raw headers
pub fn request_from_headers(
    class: KeyClass,
    key: &str,
    forwarded_for: &str,
    peer: SocketAddr,
) -> AdmissionRequest {
    let header = match class {
        KeyClass::Public => HEADER_PUBLIC_KEY,
        KeyClass::Secret => HEADER_SECRET_KEY,
    };
    let mut headers = HashMap::new();
    headers.insert(header.to_string(), key.to_string());
    headers.insert("X-Forwarded-For".to_string(), forwarded_for.to_string());
    headers.insert(HEADER_USER_AGENT.to_string(), "curl/8.5.0".to_string());

    AdmissionRequest::new(class, key, ClientMeta::from_headers(&headers, Some(peer)))
}

/// A project seeded in a `MemoryRepository` with one key of each class
#[derive(Debug, Clone)]
pub struct SeededProject {
    pub project_id: Uuid,
    pub public_key: String,
    pub secret_key: String,
}

pub fn seed_project(
    repo: &MemoryRepository,
    tier: SubscriptionTier,
    seed: u64,
) -> SeededProject {
    let project_id = repo.add_project(tier);
    let public = public_key(seed);
    let secret = secret_key(seed);
    repo.issue_key(project_id, KeyClass::Public, &public);
    repo.issue_key(project_id, KeyClass::Secret, &secret);

    SeededProject {
        project_id,
        public_key: public,
        secret_key: secret,
    }
}

/// Pipeline over fresh in-process stores, returning the handles for inspection
pub fn create_test_pipeline(
    config: GateConfig,
) -> (
    AdmissionPipeline<MockStorage, MemoryRepository>,
    Arc<MockStorage>,
    Arc<MemoryRepository>,
) {
    let storage = Arc::new(MockStorage::new());
    let repo = Arc::new(MemoryRepository::new());
    let pipeline = AdmissionPipeline::new(Arc::clone(&storage), Arc::clone(&repo), config);
    (pipeline, storage, repo)
}
