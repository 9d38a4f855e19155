// src/pipeline/gate.rs

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::StartupConfig;
use crate::context::ProjectAccessContext;
use crate::error::Result;
use crate::pipeline::{AdmissionPipeline, AdmissionRequest, Rejection};
use crate::repository::PostgresRepository;
use crate::storage::RedisStorage;

/// Pipeline wired to live Redis and PostgreSQL, with explicit startup and
/// shutdown.
#[derive(Debug)]
pub struct Gate {
    pipeline: AdmissionPipeline<RedisStorage, PostgresRepository>,
    redis: Arc<RedisStorage>,
    postgres: Arc<PostgresRepository>,
}

impl Gate {
    /// Connects both stores. Fails if either is unreachable within its timeout.
    pub async fn connect(config: StartupConfig) -> Result<Self> {
        let redis = Arc::new(RedisStorage::connect(config.redis).await?);
        redis.ping().await?;
        let postgres = Arc::new(PostgresRepository::connect(&config.postgres).await?);

        let pipeline =
            AdmissionPipeline::new(Arc::clone(&redis), Arc::clone(&postgres), config.gate);
        info!("Admission gate ready");

        Ok(Self {
            pipeline,
            redis,
            postgres,
        })
    }

    pub fn pipeline(&self) -> &AdmissionPipeline<RedisStorage, PostgresRepository> {
        &self.pipeline
    }

    pub async fn admit(
        &self,
        request: &AdmissionRequest,
    ) -> std::result::Result<ProjectAccessContext, Rejection> {
        self.pipeline.admit(request).await
    }

    /// Forces the next quota check for `project_id` to recount
    pub async fn invalidate_quota(&self, project_id: Uuid) -> Result<bool> {
        self.pipeline
            .quota()
            .invalidate(project_id, chrono::Utc::now())
            .await
    }

    /// Drops the pipeline and closes both stores
    pub async fn close(self) {
        let Self {
            pipeline,
            redis,
            postgres,
        } = self;
        drop(pipeline);

        postgres.close().await;
        if let Ok(redis) = Arc::try_unwrap(redis) {
            redis.close();
        }
        info!("Admission gate closed");
    }
}
