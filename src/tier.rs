// src/tier.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription level of the user owning a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Enterprise,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Pro => "pro",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }

    /// Parses the `subscription_type` column. Unrecognised plans get free-tier limits.
    pub fn from_column(value: &str) -> Self {
        value.parse().unwrap_or(SubscriptionTier::Free)
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(SubscriptionTier::Free),
            "pro" => Ok(SubscriptionTier::Pro),
            "enterprise" => Ok(SubscriptionTier::Enterprise),
            other => Err(format!("unknown subscription tier: {}", other)),
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits applied to one tier. `None` means unbounded: the gate is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub requests_per_minute: Option<u64>,
    pub monthly_events: Option<u64>,
}

/// The single tier → limit table read by both the project rate limiter and the
/// quota tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    #[serde(default = "default_free")]
    pub free: TierLimits,
    #[serde(default = "default_pro")]
    pub pro: TierLimits,
    #[serde(default = "default_enterprise")]
    pub enterprise: TierLimits,
}

fn default_free() -> TierLimits {
    TierLimits {
        requests_per_minute: Some(200),
        monthly_events: Some(15_000),
    }
}

fn default_pro() -> TierLimits {
    TierLimits {
        requests_per_minute: Some(2_000),
        monthly_events: Some(1_000_000),
    }
}

fn default_enterprise() -> TierLimits {
    TierLimits {
        requests_per_minute: None,
        monthly_events: None,
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            free: default_free(),
            pro: default_pro(),
            enterprise: default_enterprise(),
        }
    }
}

impl TierTable {
    pub fn limits(&self, tier: SubscriptionTier) -> TierLimits {
        match tier {
            SubscriptionTier::Free => self.free,
            SubscriptionTier::Pro => self.pro,
            SubscriptionTier::Enterprise => self.enterprise,
        }
    }
}
