// src/config/mod.rs

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{GateError, Result};
use crate::tier::TierTable;

/// Top-level configuration for the admission pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Thresholds for the fingerprint-keyed abuse counters
    #[serde(default)]
    pub abuse: AbuseConfig,

    /// Per-tier request and event limits shared by the rate limiter and quota tracker
    #[serde(default)]
    pub tiers: TierTable,

    /// How long a cached monthly event count may be served before a recount
    #[serde(default = "default_quota_cache_ttl", with = "duration_serde")]
    pub quota_cache_ttl: Duration,

    /// Window of the per-project request counter
    #[serde(default = "default_project_window", with = "duration_serde")]
    pub project_window: Duration,
}

fn default_quota_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_project_window() -> Duration {
    Duration::from_secs(60)
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            abuse: AbuseConfig::default(),
            tiers: TierTable::default(),
            quota_cache_ttl: default_quota_cache_ttl(),
            project_window: default_project_window(),
        }
    }
}

/// Configuration for the global and invalid-attempt counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseConfig {
    /// Requests per window allowed from one fingerprint, whatever the outcome
    #[serde(default = "default_global_limit")]
    pub global_limit: u64,

    /// Window for the global counter
    #[serde(default = "default_global_window", with = "duration_serde")]
    pub global_window: Duration,

    /// Invalid key attempts tolerated before the fingerprint is blocked
    #[serde(default = "default_invalid_attempt_limit")]
    pub invalid_attempt_limit: u64,

    /// Window for the invalid-attempt counter
    #[serde(default = "default_invalid_attempt_window", with = "duration_serde")]
    pub invalid_attempt_window: Duration,
}

// Above every finite tier cap so the per-project limit stays the effective one
// for well-behaved clients.
fn default_global_limit() -> u64 {
    3_000
}

fn default_global_window() -> Duration {
    Duration::from_secs(60)
}

fn default_invalid_attempt_limit() -> u64 {
    10
}

fn default_invalid_attempt_window() -> Duration {
    Duration::from_secs(5 * 60)
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            global_limit: default_global_limit(),
            global_window: default_global_window(),
            invalid_attempt_limit: default_invalid_attempt_limit(),
            invalid_attempt_window: default_invalid_attempt_window(),
        }
    }
}

/// Configuration for Redis storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Connection timeout
    #[serde(default = "default_conn_timeout", with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Deadline applied to every command
    #[serde(default = "default_command_timeout", with = "duration_serde")]
    pub command_timeout: Duration,
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_command_timeout() -> Duration {
    Duration::from_millis(250)
}

/// Configuration for the PostgreSQL access repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Connection URL
    pub url: String,

    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Time to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "duration_serde")]
    pub acquire_timeout: Duration,

    /// Server-side statement timeout
    #[serde(default = "default_statement_timeout", with = "duration_serde")]
    pub statement_timeout: Duration,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_statement_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Configuration for in-memory storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryConfig {
    /// Maximum number of entries to store
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Whether to use a background task for expiration
    #[serde(default = "default_use_background_task")]
    pub use_background_task: bool,

    /// How often to run the background expiration task
    #[serde(default = "default_cleanup_interval", with = "duration_serde")]
    pub cleanup_interval: Duration,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_use_background_task() -> bool {
    true
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            use_background_task: default_use_background_task(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

/// Everything needed to start against live stores
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub gate: GateConfig,
    pub redis: RedisConfig,
    pub postgres: PostgresConfig,
}

impl StartupConfig {
    /// Reads configuration from the process environment.
    ///
    /// Call `dotenv().ok()` first if a `.env` file should be honoured.
    /// `REDIS_URL` and `DATABASE_URL` are required; timeouts and limits are optional.
    pub fn from_env() -> Result<Self> {
        let redis_url = required_var("REDIS_URL")?;
        let database_url = required_var("DATABASE_URL")?;

        let mut gate = GateConfig::default();
        if let Some(secs) = optional_u64("GATE_QUOTA_CACHE_TTL_SECS")? {
            gate.quota_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(limit) = optional_u64("GATE_GLOBAL_LIMIT_PER_MINUTE")? {
            gate.abuse.global_limit = limit;
        }

        let mut redis = RedisConfig {
            url: redis_url,
            connection_timeout: default_conn_timeout(),
            command_timeout: default_command_timeout(),
        };
        let mut postgres = PostgresConfig {
            url: database_url,
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
            statement_timeout: default_statement_timeout(),
        };
        if let Some(ms) = optional_u64("GATE_STORE_TIMEOUT_MS")? {
            redis.command_timeout = Duration::from_millis(ms);
            postgres.acquire_timeout = Duration::from_millis(ms);
            postgres.statement_timeout = Duration::from_millis(ms);
        }

        Ok(Self {
            gate,
            redis,
            postgres,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    env::var(name).map_err(|_| GateError::Config(format!("{} is not set", name)))
}

fn optional_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| GateError::Config(format!("{} must be an integer: {}", name, e))),
        Err(_) => Ok(None),
    }
}

// Helper module to serialize/deserialize Duration with serde
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
