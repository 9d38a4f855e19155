// src/storage/tests/mod.rs


// Common utilities for storage tests
pub(crate) mod common {
    use futures::future::join_all;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time;

    use crate::error::Result;
    use crate::storage::{decode_counter, CounterStore};

    // Test basic storage operations that should work on any backend
    pub async fn test_basic_operations<S: CounterStore>(storage: &S, ns: &str) -> Result<()> {
        let key = format!("{}:basic", ns);
        let value: &[u8] = b"test_value";

        storage.set(&key, value, None).await?;
        let result = storage.get(&key).await?;
        assert_eq!(result.as_deref(), Some(value));

        let counter_key = format!("{}:counter", ns);
        let window = Duration::from_secs(30);
        assert_eq!(storage.increment_with_expiry(&counter_key, 1, window).await?, 1);
        assert_eq!(storage.increment_with_expiry(&counter_key, 3, window).await?, 4);

        // Counters read back as decimal strings
        let raw = storage.get(&counter_key).await?.unwrap_or_default();
        assert_eq!(decode_counter(&raw), Some(4));

        assert!(storage.exists(&key).await?);
        assert!(storage.exists(&counter_key).await?);
        assert!(!storage.exists(&format!("{}:missing", ns)).await?);

        assert!(storage.delete(&key).await?);
        assert!(!storage.exists(&key).await?);
        assert!(!storage.delete(&key).await?);

        let _ = storage.delete(&counter_key).await;
        Ok(())
    }

    // Expiration via set-with-TTL, and a TTL attached to a counter stored without one
    pub async fn test_key_expiration<S: CounterStore>(
        storage: &S,
        ns: &str,
        ttl: Duration,
    ) -> Result<()> {
        let key = format!("{}:expiring", ns);
        storage.set(&key, b"expiring_value", Some(ttl)).await?;
        assert!(storage.exists(&key).await?);

        time::sleep(ttl * 2).await;
        assert!(!storage.exists(&key).await?);
        assert_eq!(storage.get(&key).await?, None);

        let key2 = format!("{}:persistent_counter", ns);
        storage.set(&key2, b"5", None).await?;
        assert_eq!(storage.increment_with_expiry(&key2, 1, ttl).await?, 6);
        assert!(storage.exists(&key2).await?);

        time::sleep(ttl * 2).await;
        assert!(!storage.exists(&key2).await?);
        Ok(())
    }

    // The TTL is attached on creation and not pushed back by later increments
    pub async fn test_fixed_window_expiry<S: CounterStore>(
        storage: &S,
        ns: &str,
        ttl: Duration,
    ) -> Result<()> {
        let key = format!("{}:window", ns);
        let _ = storage.delete(&key).await;

        assert_eq!(storage.increment_with_expiry(&key, 1, ttl).await?, 1);
        time::sleep(ttl / 2).await;
        assert_eq!(storage.increment_with_expiry(&key, 1, ttl).await?, 2);

        // A sliding expiry would still be alive here
        time::sleep(ttl / 2 + ttl / 4).await;
        assert!(!storage.exists(&key).await?);

        // The next increment recreates the counter
        assert_eq!(storage.increment_with_expiry(&key, 1, ttl).await?, 1);
        let _ = storage.delete(&key).await;
        Ok(())
    }

    // Concurrent creators of one counter observe every value exactly once
    pub async fn test_concurrent_increments<S: CounterStore + 'static>(
        storage: Arc<S>,
        ns: &str,
        tasks: usize,
    ) -> Result<()> {
        let key = format!("{}:concurrent", ns);
        let _ = storage.delete(&key).await;

        let handles = (0..tasks).map(|_| {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            tokio::spawn(async move {
                storage
                    .increment_with_expiry(&key, 1, Duration::from_secs(30))
                    .await
            })
        });

        let mut seen: Vec<i64> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .collect::<Result<Vec<_>>>()?;
        seen.sort_unstable();

        let expected: Vec<i64> = (1..=tasks as i64).collect();
        assert_eq!(seen, expected);

        let _ = storage.delete(&key).await;
        Ok(())
    }
}
