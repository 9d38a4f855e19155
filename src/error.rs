// for error definitions
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    /// Malformed or missing API key, detected before any store access
    #[error("Key format error: {0}")]
    Format(String),

    /// Too many requests from one fingerprint, regardless of key
    #[error("Global rate limit exceeded: {0}")]
    GlobalRateLimited(String),

    /// Too many invalid key attempts from one fingerprint
    #[error("Too many invalid API key attempts: {0}")]
    TooManyAttempts(String),

    /// Key unknown or revoked
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Per-project request threshold exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Monthly event ceiling exceeded
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Errors related to the cache or relational backends
    #[error("Storage error: {0}")]
    Store(StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GateError {
    /// HTTP status a caller should surface for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::Format(_) | GateError::Auth(_) => 401,
            GateError::GlobalRateLimited(_)
            | GateError::TooManyAttempts(_)
            | GateError::RateLimited(_)
            | GateError::QuotaExceeded(_) => 429,
            GateError::Store(_) | GateError::Config(_) => 500,
        }
    }

    /// Message that is safe to return to the client. Never includes key material.
    pub fn public_message(&self) -> &'static str {
        match self {
            GateError::Format(_) => "Invalid API key",
            GateError::Auth(_) => "API key not found or revoked",
            GateError::GlobalRateLimited(_) => "Global rate limit exceeded",
            GateError::TooManyAttempts(_) => "Too many invalid API key attempts, try again later",
            GateError::RateLimited(_) => "Rate limit exceeded for this project",
            GateError::QuotaExceeded(_) => "Monthly event quota exceeded for this project",
            GateError::Store(_) => "Database error",
            GateError::Config(_) => "Internal server error",
        }
    }

    pub fn is_store_error(&self) -> bool {
        matches!(self, GateError::Store(_))
    }
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Redis connection errors
    #[error("Redis connection error: {0}")]
    RedisConnection(String),

    // Redis authentication errors
    #[error("Redis authentication error: {0}")]
    RedisAuth(String),

    /// Redis command errors
    #[error("Redis command error: {0}")]
    RedisCommand(String),

    /// A store call did not finish within its deadline
    #[error("Store operation timed out: {0}")]
    Timeout(String),

    /// Relational store errors
    #[error("Database error: {0}")]
    Database(String),

    /// Data serialization/deserialization errors
    #[error("Data serialization error: {0}")]
    Serialization(String),

    /// In-memory store refused a new key
    #[error("Capacity exceeded: {0}")]
    Capacity(String),
}

// Implement conversions from redis::RedisError to StorageError
impl From<redis::RedisError> for GateError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::AuthenticationFailed => {
                // authentication errors
                GateError::Store(StorageError::RedisAuth(err.to_string()))
            }
            redis::ErrorKind::IoError | redis::ErrorKind::ClientError => {
                // Connection-related errors
                GateError::Store(StorageError::RedisConnection(err.to_string()))
            }
            _ => {
                // Command/operation related errors
                GateError::Store(StorageError::RedisCommand(err.to_string()))
            }
        }
    }
}

impl From<sqlx::Error> for GateError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                GateError::Store(StorageError::Timeout("database pool".to_string()))
            }
            other => GateError::Store(StorageError::Database(other.to_string())),
        }
    }
}

// implement conversions from serde_json::Error to GateError
impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::Store(StorageError::Serialization(err.to_string()))
    }
}

// define a Result type alias for convenience
pub type Result<T> = std::result::Result<T, GateError>;
