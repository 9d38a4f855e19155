#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time;

    use crate::limiter::FixedWindowCounter;
    use crate::test_utils::MockStorage;

    fn counter(limit: u64, window: Duration) -> FixedWindowCounter<MockStorage> {
        FixedWindowCounter::new(Arc::new(MockStorage::new()), "fw_test", limit, window)
    }

    /// The limit-th request is admitted and the next one rejected
    #[tokio::test]
    async fn test_limit_boundary() {
        let counter = counter(5, Duration::from_secs(60));

        for i in 1..=5 {
            let status = counter.check_and_record("client").await.unwrap();
            assert!(status.allowed, "Request {} should be allowed", i);
            assert_eq!(status.count, i);
        }

        let status = counter.check_and_record("client").await.unwrap();
        assert!(!status.allowed, "Request beyond the limit should be denied");
        assert_eq!(status.count, 6);
        assert_eq!(status.remaining(), 0);
    }

    /// Keys are isolated from each other
    #[tokio::test]
    async fn test_key_isolation() {
        let counter = counter(1, Duration::from_secs(60));

        assert!(counter.check_and_record("a").await.unwrap().allowed);
        assert!(!counter.check_and_record("a").await.unwrap().allowed);
        assert!(counter.check_and_record("b").await.unwrap().allowed);
        assert_eq!(counter.key("b"), "fw_test:b");
    }

    /// The whole counter resets once the window lapses
    #[tokio::test]
    async fn test_window_reset() {
        let counter = counter(2, Duration::from_millis(150));

        assert!(counter.check_and_record("client").await.unwrap().allowed);
        assert!(counter.check_and_record("client").await.unwrap().allowed);
        assert!(!counter.check_and_record("client").await.unwrap().allowed);

        time::sleep(Duration::from_millis(250)).await;

        let status = counter.check_and_record("client").await.unwrap();
        assert!(status.allowed, "Request in a new window should be allowed");
        assert_eq!(status.count, 1);
    }

    /// Rejected requests still count, so hammering never extends the window
    #[tokio::test]
    async fn test_rejected_requests_do_not_extend_window() {
        let counter = counter(1, Duration::from_millis(200));

        assert!(counter.check_and_record("client").await.unwrap().allowed);
        for _ in 0..5 {
            assert!(!counter.check_and_record("client").await.unwrap().allowed);
            time::sleep(Duration::from_millis(30)).await;
        }

        time::sleep(Duration::from_millis(100)).await;
        assert!(counter.check_and_record("client").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_peek_and_reset() {
        let counter = counter(3, Duration::from_secs(60));

        assert_eq!(counter.peek("client").await.unwrap(), 0);
        counter.check_and_record("client").await.unwrap();
        counter.check_and_record("client").await.unwrap();
        assert_eq!(counter.peek("client").await.unwrap(), 2);
        assert_eq!(counter.peek("client").await.unwrap(), 2, "peek must not count");

        counter.reset("client").await.unwrap();
        assert_eq!(counter.peek("client").await.unwrap(), 0);
    }

    /// Concurrent requests never admit more than the limit
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_respect_limit() {
        let counter = Arc::new(counter(20, Duration::from_secs(60)));

        let handles = (0..50).map(|_| {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move { counter.check_and_record("shared").await.unwrap() })
        });

        let allowed = join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|status| status.allowed)
            .count();

        assert_eq!(allowed, 20);
        assert_eq!(counter.peek("shared").await.unwrap(), 50);
    }
}
