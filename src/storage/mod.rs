// src/storage/mod.rs

pub mod memory;
pub mod redis;

#[cfg(test)]
mod tests;

pub use memory::MemoryStorage;
pub use redis::RedisStorage;

use super::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Builds a store key namespaced as `<prefix>:<id>`
pub fn namespaced(prefix: &str, id: &str) -> String {
    format!("{}:{}", prefix, id)
}

/// Shared counter/cache store consulted by the admission pipeline.
///
/// Implementations must make `increment_with_expiry` atomic: concurrent callers
/// racing to create the same counter all observe distinct, consistent counts.
#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    // The type of configuration this storage backend accepts
    type Config: Send + Sync;

    // Creates a new instance of this storage backend with the given configuration
    async fn new(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    // Retrieves a value by key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    // Stores a value with a key
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Atomically increments a counter and attaches `ttl` if the counter has no
    /// expiry yet. An existing expiry is never extended, so windows stay fixed.
    async fn increment_with_expiry(&self, key: &str, amount: i64, ttl: Duration) -> Result<i64>;

    // Checks if a key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    // Deletes a key
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Decodes a counter value. Both backends store counters as decimal strings.
pub fn decode_counter(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
}
