// src/repository/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, Pool, Postgres};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::error::{GateError, Result, StorageError};
use crate::keys::KeyClass;
use crate::repository::{AccessRepository, ProjectIdentity};
use crate::tier::SubscriptionTier;

const FIND_BY_PUBLIC_KEY: &str = r#"
    SELECT
        p.uuid AS project_id,
        u.uuid AS user_id,
        u.subscription_type,
        u.status,
        u.role
    FROM project_api_keys pak
    JOIN projects p ON pak.project_id = p.uuid
    JOIN "user" u ON p.user_id = u.uuid
    WHERE pak.public_key = $1
      AND pak.revoked = false
    LIMIT 1
"#;

const FIND_BY_SECRET_KEY: &str = r#"
    SELECT
        p.uuid AS project_id,
        u.uuid AS user_id,
        u.subscription_type,
        u.status,
        u.role
    FROM project_api_keys pak
    JOIN projects p ON pak.project_id = p.uuid
    JOIN "user" u ON p.user_id = u.uuid
    WHERE pak.secret_key = $1
      AND pak.revoked = false
    LIMIT 1
"#;

const COUNT_EVENTS_SINCE: &str = r#"
    SELECT COUNT(*)
    FROM analytics_events
    WHERE project_id = $1
      AND timestamp >= $2
"#;

#[derive(Debug, FromRow)]
struct IdentityRow {
    project_id: Uuid,
    user_id: Uuid,
    subscription_type: String,
    status: String,
    role: String,
}

impl From<IdentityRow> for ProjectIdentity {
    fn from(row: IdentityRow) -> Self {
        Self {
            project_id: row.project_id,
            user_id: row.user_id,
            subscription_type: SubscriptionTier::from_column(&row.subscription_type),
            user_status: row.status,
            user_role: row.role,
        }
    }
}

/// PostgreSQL-backed access repository
#[derive(Clone)]
pub struct PostgresRepository {
    pool: Pool<Postgres>,
}

impl fmt::Debug for PostgresRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresRepository")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresRepository {
    /// Opens a connection pool and verifies one connection can be acquired
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let opts = PgConnectOptions::from_str(&config.url)
            .map_err(|e| GateError::Config(format!("invalid DATABASE_URL: {}", e)))?
            .options([(
                "statement_timeout",
                format!("{}ms", config.statement_timeout.as_millis()),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(opts)
            .await?;

        info!(
            max_connections = config.max_connections,
            statement_timeout_ms = config.statement_timeout.as_millis() as u64,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Closes every pooled connection
    pub async fn close(&self) {
        debug!("Closing PostgreSQL pool");
        self.pool.close().await;
    }
}

#[async_trait]
impl AccessRepository for PostgresRepository {
    async fn find_active_binding(
        &self,
        class: KeyClass,
        key: &str,
    ) -> Result<Option<ProjectIdentity>> {
        let query = match class {
            KeyClass::Public => FIND_BY_PUBLIC_KEY,
            KeyClass::Secret => FIND_BY_SECRET_KEY,
        };

        let row = sqlx::query_as::<_, IdentityRow>(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ProjectIdentity::from))
    }

    async fn count_events_since(&self, project_id: Uuid, since: DateTime<Utc>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(COUNT_EVENTS_SINCE)
            .bind(project_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        u64::try_from(count).map_err(|_| {
            GateError::Store(StorageError::Database(format!(
                "negative event count {} for project {}",
                count, project_id
            )))
        })
    }
}
