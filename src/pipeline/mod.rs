// src/pipeline/mod.rs

//! The ordered admission checks a request must pass before reaching a handler.
//!
//! `Fingerprint → FormatCheck → AbuseLimit → KeyResolve → ProjectRateLimit →
//! QuotaCheck → Admit`. Stages run strictly forward and the first failure
//! ends the request. Nothing is retried here.

pub mod gate;

#[cfg(test)]
mod tests;

pub use gate::Gate;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::auth::AuthResolver;
use crate::config::GateConfig;
use crate::context::ProjectAccessContext;
use crate::error::GateError;
use crate::fingerprint::{ClientMeta, Fingerprint};
use crate::keys::{validate_key_format, KeyClass};
use crate::limiter::{AbuseLimiter, TieredRateLimiter};
use crate::quota::QuotaTracker;
use crate::repository::AccessRepository;
use crate::storage::CounterStore;

/// States of a request moving through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    FingerprintComputed,
    FormatChecked,
    AbuseChecked,
    Resolved,
    ProjectRateChecked,
    QuotaChecked,
    Admitted,
}

/// What the pipeline needs from an incoming request
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub key_class: KeyClass,
    pub api_key: String,
    pub client: ClientMeta,
    pub received_at: DateTime<Utc>,
}

impl AdmissionRequest {
    pub fn new(key_class: KeyClass, api_key: impl Into<String>, client: ClientMeta) -> Self {
        Self {
            key_class,
            api_key: api_key.into(),
            client,
            received_at: Utc::now(),
        }
    }

    /// Pins the arrival time, which selects the quota month and the visitor day
    pub fn with_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }

    /// Daily-rotating fingerprint for unique-visitor counting downstream
    pub fn visitor_fingerprint(&self) -> Fingerprint {
        let day: NaiveDate = self.received_at.date_naive();
        self.client.visitor_fingerprint(day)
    }
}

/// A request that did not make it through
#[derive(Debug, Error)]
#[error("rejected with {status} after {stage:?}: {error}")]
pub struct Rejection {
    /// HTTP status to answer with
    pub status: u16,
    /// Body message safe to show the caller
    pub message: &'static str,
    /// Last state the request reached
    pub stage: PipelineStage,
    #[source]
    pub error: GateError,
}

impl Rejection {
    fn new(stage: PipelineStage, error: GateError) -> Self {
        Self {
            status: error.status_code(),
            message: error.public_message(),
            stage,
            error,
        }
    }
}

/// Admission pipeline over injected store handles
#[derive(Debug)]
pub struct AdmissionPipeline<S, R>
where
    S: CounterStore,
    R: AccessRepository,
{
    abuse: AbuseLimiter<S>,
    auth: AuthResolver<R>,
    project_limiter: TieredRateLimiter<S>,
    quota: QuotaTracker<S, R>,
}

impl<S, R> AdmissionPipeline<S, R>
where
    S: CounterStore,
    R: AccessRepository,
{
    pub fn new(storage: Arc<S>, repository: Arc<R>, config: GateConfig) -> Self {
        Self {
            abuse: AbuseLimiter::new(Arc::clone(&storage), &config.abuse),
            auth: AuthResolver::new(Arc::clone(&repository)),
            project_limiter: TieredRateLimiter::new(
                Arc::clone(&storage),
                config.tiers.clone(),
                config.project_window,
            ),
            quota: QuotaTracker::new(storage, repository, config.tiers, config.quota_cache_ttl),
        }
    }

    pub fn quota(&self) -> &QuotaTracker<S, R> {
        &self.quota
    }

    /// Runs every stage in order and returns the context of an admitted request
    pub async fn admit(
        &self,
        request: &AdmissionRequest,
    ) -> Result<ProjectAccessContext, Rejection> {
        let fingerprint = request.client.abuse_fingerprint();
        let stage = advance(PipelineStage::Start, PipelineStage::FingerprintComputed);

        if let Err(format_error) = validate_key_format(request.key_class, &request.api_key) {
            return Err(self.reject_malformed(stage, &fingerprint, format_error).await);
        }
        let stage = advance(stage, PipelineStage::FormatChecked);

        self.abuse
            .record_request(&fingerprint)
            .await
            .map_err(|e| reject(stage, e))?;
        self.abuse
            .check_invalid_attempts(&fingerprint)
            .await
            .map_err(|e| reject(stage, e))?;
        let stage = advance(stage, PipelineStage::AbuseChecked);

        let identity = match self.auth.resolve(request.key_class, &request.api_key).await {
            Ok(identity) => identity,
            Err(e @ GateError::Auth(_)) => {
                // The caller sees the 401 even when this attempt tips the threshold;
                // the block applies from the next request on.
                let _ = self.abuse.record_invalid_attempt(&fingerprint).await;
                return Err(reject(stage, e));
            }
            Err(e) => return Err(reject(stage, e)),
        };
        let stage = advance(stage, PipelineStage::Resolved);

        self.project_limiter
            .check(
                identity.project_id,
                identity.subscription_type,
                request.key_class,
                &fingerprint,
            )
            .await
            .map_err(|e| reject(stage, e))?;
        let stage = advance(stage, PipelineStage::ProjectRateChecked);

        let total_events = self
            .quota
            .check(&identity, request.received_at)
            .await
            .map_err(|e| reject(stage, e))?;
        let stage = advance(stage, PipelineStage::QuotaChecked);

        let context = ProjectAccessContext::assemble(identity, total_events);
        advance(stage, PipelineStage::Admitted);
        info!(
            project_id = %context.project_id(),
            tier = %context.subscription_type(),
            total_events,
            "Request admitted"
        );

        Ok(context)
    }

    // A malformed key never reaches the relational store. It still counts
    // against both fingerprint counters.
    async fn reject_malformed(
        &self,
        stage: PipelineStage,
        fingerprint: &Fingerprint,
        format_error: GateError,
    ) -> Rejection {
        if let Err(e) = self.abuse.record_request(fingerprint).await {
            return reject(stage, e);
        }
        if let Err(e) = self.abuse.record_invalid_attempt(fingerprint).await {
            return reject(stage, e);
        }
        reject(stage, format_error)
    }
}

fn advance(from: PipelineStage, to: PipelineStage) -> PipelineStage {
    debug!(from = ?from, to = ?to, "Pipeline transition");
    to
}

fn reject(stage: PipelineStage, error: GateError) -> Rejection {
    let rejection = Rejection::new(stage, error);
    if rejection.error.is_store_error() {
        error!(stage = ?stage, status = rejection.status, error = %rejection.error, "Request rejected");
    } else {
        info!(stage = ?stage, status = rejection.status, reason = %rejection.error, "Request rejected");
    }
    rejection
}
