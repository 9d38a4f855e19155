// library entry
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod limiter;
pub mod logging;
pub mod pipeline;
pub mod quota;
pub mod repository;
pub mod storage;
pub mod tier;

#[cfg(test)]
pub mod test_utils;

// Re-export key components for convenience
pub use config::{GateConfig, StartupConfig};
pub use context::ProjectAccessContext;
pub use error::{GateError, Result, StorageError};
pub use fingerprint::{ClientMeta, Fingerprint};
pub use keys::KeyClass;
pub use logging::init as init_logging;
pub use pipeline::{AdmissionPipeline, AdmissionRequest, Gate, PipelineStage, Rejection};
pub use tier::{SubscriptionTier, TierTable};
