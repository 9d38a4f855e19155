// src/context.rs

use serde::Serialize;
use uuid::Uuid;

use crate::repository::ProjectIdentity;
use crate::tier::SubscriptionTier;

/// Identity of an admitted request, handed to downstream handlers.
///
/// Only the pipeline builds one, after every gate has passed, and nothing can
/// change it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectAccessContext {
    project_id: Uuid,
    user_id: Uuid,
    subscription_type: SubscriptionTier,
    user_status: String,
    user_role: String,
    total_events: u64,
}

impl ProjectAccessContext {
    pub(crate) fn assemble(identity: ProjectIdentity, total_events: u64) -> Self {
        Self {
            project_id: identity.project_id,
            user_id: identity.user_id,
            subscription_type: identity.subscription_type,
            user_status: identity.user_status,
            user_role: identity.user_role,
            total_events,
        }
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn subscription_type(&self) -> SubscriptionTier {
        self.subscription_type
    }

    pub fn user_status(&self) -> &str {
        &self.user_status
    }

    pub fn user_role(&self) -> &str {
        &self.user_role
    }

    pub fn total_events(&self) -> u64 {
        self.total_events
    }
}
