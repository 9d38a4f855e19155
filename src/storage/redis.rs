// src/storage/redis.rs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult, Script};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::RedisConfig;
use crate::error::{GateError, Result, StorageError};
use crate::storage::CounterStore;
use crate::storage_op;

// INCRBY and first-expiry in one round trip so concurrent creators cannot
// leave a counter without a TTL.
static INCR_WITH_EXPIRY: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local count = redis.call('INCRBY', KEYS[1], ARGV[1])
        if redis.call('PTTL', KEYS[1]) < 0 then
            redis.call('PEXPIRE', KEYS[1], ARGV[2])
        end
        return count
        "#,
    )
});

/// Redis-backed counter store.
///
/// The connection manager is cloned for every command, so no lock is held
/// while a command is in flight. Every command runs under `command_timeout`.
#[derive(Clone)]
pub struct RedisStorage {
    client: Client,
    connection: ConnectionManager,
    config: RedisConfig,
}

// Manually implement Debug
impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("url", &self.config.url)
            .field("command_timeout", &self.config.command_timeout)
            .finish()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

impl RedisStorage {
    /// Connects to Redis, failing if the connection is not up within `connection_timeout`
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str())
            .map_err(|e| GateError::Store(StorageError::RedisConnection(e.to_string())))?;

        let connection_future = ConnectionManager::new(client.clone());

        let connection =
            match tokio::time::timeout(config.connection_timeout, connection_future).await {
                Ok(result) => result.map_err(|e| {
                    GateError::Store(StorageError::RedisConnection(e.to_string()))
                })?,
                Err(_) => {
                    return Err(GateError::Store(StorageError::RedisConnection(format!(
                        "Connection to Redis at {} timed out after {:?}",
                        config.url, config.connection_timeout
                    ))));
                }
            };

        info!(command_timeout = ?config.command_timeout, "Connected to Redis");

        Ok(Self {
            client,
            connection,
            config,
        })
    }

    /// Ping Redis to check health
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let result: String = self
            .with_timeout("PING", "-", redis::cmd("PING").query_async(&mut conn))
            .await?;

        if result == "PONG" {
            Ok(())
        } else {
            Err(GateError::Store(StorageError::RedisCommand(format!(
                "Unexpected response from Redis PING: {}",
                result
            ))))
        }
    }

    /// Releases the connection. Clones held elsewhere keep working until dropped.
    pub fn close(self) {
        debug!(url = %self.config.url, "Closing Redis connection");
        drop(self.connection);
        drop(self.client);
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(inner) => inner.map_err(GateError::from),
            Err(_) => Err(GateError::Store(StorageError::Timeout(format!(
                "Redis {} on {} timed out after {:?}",
                operation, key, self.config.command_timeout
            )))),
        };
        storage_op!(operation, key, result, started.elapsed().as_millis() as u64);
        result
    }
}

#[async_trait]
impl CounterStore for RedisStorage {
    type Config = RedisConfig;

    async fn new(config: Self::Config) -> Result<Self> {
        Self::connect(config).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        self.with_timeout("GET", key, conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection.clone();
        match ttl {
            Some(ttl) => {
                self.with_timeout("PSETEX", key, conn.pset_ex(key, value, ttl_millis(ttl)))
                    .await
            }
            None => self.with_timeout("SET", key, conn.set(key, value)).await,
        }
    }

    async fn increment_with_expiry(&self, key: &str, amount: i64, ttl: Duration) -> Result<i64> {
        let mut conn = self.connection.clone();
        self.with_timeout(
            "EVALSHA",
            key,
            INCR_WITH_EXPIRY
                .key(key)
                .arg(amount)
                .arg(ttl_millis(ttl))
                .invoke_async(&mut conn),
        )
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        self.with_timeout("EXISTS", key, conn.exists(key)).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = self.with_timeout("DEL", key, conn.del(key)).await?;
        Ok(removed > 0)
    }
}
