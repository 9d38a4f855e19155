#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_test::traced_test;
    use uuid::Uuid;

    use crate::error::GateError;
    use crate::fingerprint::Fingerprint;
    use crate::keys::KeyClass;
    use crate::limiter::TieredRateLimiter;
    use crate::test_utils::MockStorage;
    use crate::tier::{SubscriptionTier, TierLimits, TierTable};

    fn small_tiers() -> TierTable {
        TierTable {
            free: TierLimits {
                requests_per_minute: Some(3),
                monthly_events: Some(100),
            },
            pro: TierLimits {
                requests_per_minute: Some(6),
                monthly_events: Some(1_000),
            },
            enterprise: TierLimits {
                requests_per_minute: None,
                monthly_events: None,
            },
        }
    }

    fn limiter() -> (TieredRateLimiter<MockStorage>, Arc<MockStorage>) {
        let storage = Arc::new(MockStorage::new());
        (
            TieredRateLimiter::new(Arc::clone(&storage), small_tiers(), Duration::from_secs(60)),
            storage,
        )
    }

    fn fp(addr: &str) -> Fingerprint {
        Fingerprint::abuse(addr, "Mozilla/5.0")
    }

    #[tokio::test]
    async fn test_cap_selected_by_tier() {
        let (limiter, _) = limiter();
        let free = Uuid::new_v4();
        let pro = Uuid::new_v4();
        let client = fp("192.0.2.10");

        for _ in 0..3 {
            limiter
                .check(free, SubscriptionTier::Free, KeyClass::Secret, &client)
                .await
                .unwrap();
        }
        let err = limiter
            .check(free, SubscriptionTier::Free, KeyClass::Secret, &client)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::RateLimited(_)));
        assert_eq!(err.public_message(), "Rate limit exceeded for this project");

        for _ in 0..6 {
            limiter
                .check(pro, SubscriptionTier::Pro, KeyClass::Secret, &client)
                .await
                .unwrap();
        }
        assert!(limiter
            .check(pro, SubscriptionTier::Pro, KeyClass::Secret, &client)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_enterprise_bypasses_store() {
        let (limiter, storage) = limiter();
        let project = Uuid::new_v4();
        let client = fp("192.0.2.10");

        for _ in 0..1_000 {
            limiter
                .check(project, SubscriptionTier::Enterprise, KeyClass::Secret, &client)
                .await
                .unwrap();
        }
        assert_eq!(storage.calls(), 0);
    }

    #[tokio::test]
    async fn test_public_path_budget_is_per_fingerprint() {
        let (limiter, _) = limiter();
        let project = Uuid::new_v4();
        let first = fp("192.0.2.10");
        let second = fp("198.51.100.20");

        for _ in 0..3 {
            limiter
                .check(project, SubscriptionTier::Free, KeyClass::Public, &first)
                .await
                .unwrap();
        }
        assert!(limiter
            .check(project, SubscriptionTier::Free, KeyClass::Public, &first)
            .await
            .is_err());

        // Another visitor of the same project still has budget
        assert!(limiter
            .check(project, SubscriptionTier::Free, KeyClass::Public, &second)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_secret_path_budget_is_shared() {
        let (limiter, _) = limiter();
        let project = Uuid::new_v4();

        for addr in ["192.0.2.1", "198.51.100.1", "203.0.113.1"] {
            limiter
                .check(project, SubscriptionTier::Free, KeyClass::Secret, &fp(addr))
                .await
                .unwrap();
        }
        assert!(limiter
            .check(project, SubscriptionTier::Free, KeyClass::Secret, &fp("10.0.0.1"))
            .await
            .is_err());
    }

    #[test]
    fn test_counter_id_layout() {
        let project = Uuid::nil();
        let client = fp("192.0.2.10");
        assert_eq!(
            TieredRateLimiter::<MockStorage>::counter_id(project, KeyClass::Secret, &client),
            project.to_string()
        );
        assert_eq!(
            TieredRateLimiter::<MockStorage>::counter_id(project, KeyClass::Public, &client),
            format!("{}:{}", project, client)
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_store_failure_fails_open() {
        let (limiter, storage) = limiter();
        storage.set_failing(true);
        let project = Uuid::new_v4();

        for _ in 0..10 {
            assert!(limiter
                .check(project, SubscriptionTier::Free, KeyClass::Secret, &fp("192.0.2.10"))
                .await
                .is_ok());
        }
        assert!(logs_contain("Project counter unavailable"));
    }
}
