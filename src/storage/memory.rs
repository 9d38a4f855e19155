// src/storage/memory.rs

// In-memory storage (for testing, simulation and single-node usage)
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::task::{self, JoinHandle};
use tokio::time;

use crate::config::InMemoryConfig;
use crate::error::{GateError, Result, StorageError};
use crate::storage::{decode_counter, CounterStore};

/// Entry in the in-memory storage
#[derive(Debug)]
struct MemoryEntry {
    value: Vec<u8>,
    expiry: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expiry.map_or(true, |expiry| expiry > now)
    }
}

type Entries = Arc<RwLock<HashMap<String, MemoryEntry>>>;

/// In-memory storage backend implementation
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: Entries,
    config: InMemoryConfig,
    _cleanup_task: Option<Arc<CleanupTask>>,
}

/// Aborts the background sweep when the last store clone is dropped
#[derive(Debug)]
struct CleanupTask(JoinHandle<()>);

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn read(data: &Entries) -> RwLockReadGuard<'_, HashMap<String, MemoryEntry>> {
    data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(data: &Entries) -> RwLockWriteGuard<'_, HashMap<String, MemoryEntry>> {
    data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStorage {
    /// Creates a new in-memory storage with the given configuration.
    ///
    /// With `use_background_task` set this must be called inside a Tokio runtime.
    pub fn new(config: InMemoryConfig) -> Self {
        let data: Entries = Arc::new(RwLock::new(HashMap::with_capacity(
            config.max_entries.min(10_000),
        )));

        let cleanup_task = if config.use_background_task {
            let data_clone = Arc::clone(&data);
            let period = config.cleanup_interval;

            let handle = task::spawn(async move {
                let mut interval = time::interval(period);
                loop {
                    interval.tick().await;
                    Self::cleanup_expired_entries(&data_clone);
                }
            });

            Some(Arc::new(CleanupTask(handle)))
        } else {
            None
        };

        Self {
            data,
            config,
            _cleanup_task: cleanup_task,
        }
    }

    /// Clean up expired entries
    fn cleanup_expired_entries(data: &Entries) {
        let now = Instant::now();
        write(data).retain(|_, entry| entry.is_live(now));
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        read(&self.data)
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of a key, if it exists and has an expiry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        read(&self.data)
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expiry)
            .map(|expiry| expiry.saturating_duration_since(now))
    }

    // Expired entries still count towards `len()` until swept, so a full map is
    // swept before a new key is refused
    fn check_capacity(
        &self,
        data: &mut HashMap<String, MemoryEntry>,
        key: &str,
        now: Instant,
    ) -> Result<()> {
        if data.len() < self.config.max_entries || data.contains_key(key) {
            return Ok(());
        }

        data.retain(|_, entry| entry.is_live(now));
        if data.len() >= self.config.max_entries {
            return Err(GateError::Store(StorageError::Capacity(format!(
                "Maximum entries limit of {} exceeded",
                self.config.max_entries
            ))));
        }
        Ok(())
    }

    // Increment under one write lock; the expiry is only set on a counter without one
    fn apply_increment(&self, key: &str, amount: i64, ttl: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut data = write(&self.data);

        if data.get(key).is_some_and(|entry| !entry.is_live(now)) {
            data.remove(key);
        }

        let (current, expiry) = match data.get(key) {
            Some(entry) => {
                let current = decode_counter(&entry.value).ok_or_else(|| {
                    GateError::Store(StorageError::Serialization(format!(
                        "value at {} is not an integer",
                        key
                    )))
                })?;
                (current, entry.expiry)
            }
            None => {
                self.check_capacity(&mut data, key, now)?;
                (0, None)
            }
        };

        let expiry = expiry.unwrap_or(now + ttl);

        let new_value = current + amount;
        data.insert(
            key.to_string(),
            MemoryEntry {
                value: new_value.to_string().into_bytes(),
                expiry: Some(expiry),
            },
        );

        Ok(new_value)
    }
}

#[async_trait]
impl CounterStore for MemoryStorage {
    type Config = InMemoryConfig;

    async fn new(config: Self::Config) -> Result<Self> {
        Ok(Self::new(config))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        Ok(read(&self.data)
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut data = write(&self.data);
        self.check_capacity(&mut data, key, now)?;

        let expiry = ttl.map(|duration| now + duration);
        data.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expiry,
            },
        );

        Ok(())
    }

    async fn increment_with_expiry(&self, key: &str, amount: i64, ttl: Duration) -> Result<i64> {
        self.apply_increment(key, amount, ttl)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(read(&self.data)
            .get(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(write(&self.data)
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }
}
