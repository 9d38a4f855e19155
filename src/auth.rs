// src/auth.rs

use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{GateError, Result};
use crate::keys::KeyClass;
use crate::repository::{AccessRepository, ProjectIdentity};

/// Resolves a well-formed key to the identity of its project and owner
#[derive(Debug)]
pub struct AuthResolver<R>
where
    R: AccessRepository,
{
    repository: Arc<R>,
}

impl<R> AuthResolver<R>
where
    R: AccessRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Unknown and revoked keys produce the same `Auth` error, so callers
    /// cannot tell which one they hit. Store faults surface as `Store`.
    pub async fn resolve(&self, class: KeyClass, key: &str) -> Result<ProjectIdentity> {
        match self.repository.find_active_binding(class, key).await {
            Ok(Some(identity)) => {
                debug!(
                    project_id = %identity.project_id,
                    tier = %identity.subscription_type,
                    "Resolved API key"
                );
                Ok(identity)
            }
            Ok(None) => Err(GateError::Auth(format!(
                "no active binding for {} key",
                class
            ))),
            Err(e) => {
                error!(class = %class, error = %e, "Key lookup failed");
                Err(e)
            }
        }
    }
}
