use async_trait::async_trait;
use boxoffice_core::{Acquire, IdempotencyRegistry, KeyState, LeaseToken, RegistryResult};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_PENDING_LEASE: Duration = Duration::from_secs(30);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct KeyRecord {
    state: KeyState,
    owner: LeaseToken,
    updated_at: Instant,
}

struct Records {
    by_key: HashMap<String, KeyRecord>,
    last_sweep: Instant,
}

impl Records {
    /// Live record for `key`; an expired one reads as absent.
    fn live(&mut self, key: &str, now: Instant, retention: Duration) -> Option<&mut KeyRecord> {
        self.by_key
            .get_mut(key)
            .filter(|record| now.duration_since(record.updated_at) < retention)
    }
}

/// Process-local inbound key registry.
///
/// Records older than `retention` read as absent and are dropped by a sweep
/// that runs at most once per `sweep_interval`. A pending record older than
/// `pending_lease` is treated as abandoned by a crashed request and can be
/// taken over.
pub struct InMemoryIdempotencyRegistry {
    records: Mutex<Records>,
    retention: Duration,
    pending_lease: Duration,
    sweep_interval: Duration,
}

impl InMemoryIdempotencyRegistry {
    pub fn new(retention: Duration, pending_lease: Duration) -> Self {
        Self {
            records: Mutex::new(Records {
                by_key: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            retention,
            pending_lease,
            sweep_interval: retention.min(MAX_SWEEP_INTERVAL),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub async fn state_of(&self, key: &str) -> Option<KeyState> {
        let now = Instant::now();
        self.records
            .lock()
            .await
            .live(key, now, self.retention)
            .map(|r| r.state)
    }

    fn sweep_if_due(&self, records: &mut Records, now: Instant) {
        if now.duration_since(records.last_sweep) < self.sweep_interval {
            return;
        }
        let retention = self.retention;
        records
            .by_key
            .retain(|_, record| now.duration_since(record.updated_at) < retention);
        records.last_sweep = now;
    }
}

impl Default for InMemoryIdempotencyRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_PENDING_LEASE)
    }
}

#[async_trait]
impl IdempotencyRegistry for InMemoryIdempotencyRegistry {
    async fn try_acquire(&self, key: &str) -> RegistryResult<Acquire> {
        let now = Instant::now();
        let mut records = self.records.lock().await;
        self.sweep_if_due(&mut records, now);

        let taken = match records.live(key, now, self.retention) {
            None => false,
            Some(record) => match record.state {
                KeyState::Applied => true,
                KeyState::Failed => false,
                KeyState::Pending => now.duration_since(record.updated_at) < self.pending_lease,
            },
        };
        if taken {
            return Ok(Acquire::AlreadySeen);
        }

        let token = LeaseToken::generate();
        records.by_key.insert(
            key.to_string(),
            KeyRecord {
                state: KeyState::Pending,
                owner: token.clone(),
                updated_at: now,
            },
        );
        Ok(Acquire::Fresh(token))
    }

    async fn mark_applied(&self, key: &str, token: &LeaseToken) -> RegistryResult<()> {
        let mut records = self.records.lock().await;
        records.by_key.insert(
            key.to_string(),
            KeyRecord {
                state: KeyState::Applied,
                owner: token.clone(),
                updated_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn mark_failed(&self, key: &str, token: &LeaseToken) -> RegistryResult<()> {
        let now = Instant::now();
        let mut records = self.records.lock().await;
        if let Some(record) = records.live(key, now, self.retention) {
            if record.state == KeyState::Pending && record.owner == *token {
                record.state = KeyState::Failed;
                record.updated_at = now;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn acquire(registry: &InMemoryIdempotencyRegistry, key: &str) -> LeaseToken {
        match registry.try_acquire(key).await.unwrap() {
            Acquire::Fresh(token) => token,
            Acquire::AlreadySeen => panic!("{} should be fresh", key),
        }
    }

    impl InMemoryIdempotencyRegistry {
        async fn stored_len(&self) -> usize {
            self.records.lock().await.by_key.len()
        }
    }

    #[tokio::test]
    async fn test_applied_key_is_never_reacquired() {
        let registry = InMemoryIdempotencyRegistry::default();

        let token = acquire(&registry, "t1").await;
        assert_eq!(registry.try_acquire("t1").await.unwrap(), Acquire::AlreadySeen);

        registry.mark_applied("t1", &token).await.unwrap();
        assert_eq!(registry.try_acquire("t1").await.unwrap(), Acquire::AlreadySeen);
        assert_eq!(registry.state_of("t1").await, Some(KeyState::Applied));
    }

    #[tokio::test]
    async fn test_mark_failed_does_not_reopen_applied_key() {
        let registry = InMemoryIdempotencyRegistry::default();

        let token = acquire(&registry, "t5").await;
        registry.mark_applied("t5", &token).await.unwrap();
        registry.mark_failed("t5", &token).await.unwrap();

        assert_eq!(registry.state_of("t5").await, Some(KeyState::Applied));
        assert_eq!(registry.try_acquire("t5").await.unwrap(), Acquire::AlreadySeen);
    }

    #[tokio::test]
    async fn test_stale_owner_cannot_fail_taken_over_key() {
        let registry = InMemoryIdempotencyRegistry::new(DEFAULT_RETENTION, Duration::ZERO);

        let stale = acquire(&registry, "t6").await;
        let current = acquire(&registry, "t6").await;
        assert_ne!(stale, current);

        registry.mark_failed("t6", &stale).await.unwrap();
        assert_eq!(registry.state_of("t6").await, Some(KeyState::Pending));

        registry.mark_failed("t6", &current).await.unwrap();
        assert_eq!(registry.state_of("t6").await, Some(KeyState::Failed));
    }

    #[tokio::test]
    async fn test_failed_key_is_retryable() {
        let registry = InMemoryIdempotencyRegistry::default();

        let token = acquire(&registry, "t2").await;
        registry.mark_failed("t2", &token).await.unwrap();
        assert!(registry.try_acquire("t2").await.unwrap().is_fresh());
        assert_eq!(registry.state_of("t2").await, Some(KeyState::Pending));
    }

    #[tokio::test]
    async fn test_abandoned_pending_key_is_retryable() {
        let registry = InMemoryIdempotencyRegistry::new(DEFAULT_RETENTION, Duration::ZERO);

        assert!(registry.try_acquire("t3").await.unwrap().is_fresh());
        assert!(registry.try_acquire("t3").await.unwrap().is_fresh());
    }

    #[tokio::test]
    async fn test_records_expire_after_retention() {
        let registry = InMemoryIdempotencyRegistry::new(Duration::ZERO, DEFAULT_PENDING_LEASE);

        let token = acquire(&registry, "t4").await;
        registry.mark_applied("t4", &token).await.unwrap();
        assert!(registry.try_acquire("t4").await.unwrap().is_fresh());
    }

    #[tokio::test]
    async fn test_expired_records_are_swept_lazily() {
        let retention = Duration::from_millis(20);
        let lazy = InMemoryIdempotencyRegistry::new(retention, DEFAULT_PENDING_LEASE)
            .with_sweep_interval(Duration::from_secs(3600));
        let eager = InMemoryIdempotencyRegistry::new(retention, DEFAULT_PENDING_LEASE)
            .with_sweep_interval(Duration::ZERO);

        acquire(&lazy, "old").await;
        acquire(&eager, "old").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        acquire(&lazy, "new").await;
        acquire(&eager, "new").await;

        // Not swept yet, but the expired record no longer counts.
        assert_eq!(lazy.stored_len().await, 2);
        assert_eq!(lazy.state_of("old").await, None);
        assert!(lazy.try_acquire("old").await.unwrap().is_fresh());

        assert_eq!(eager.stored_len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_has_one_winner() {
        let registry = Arc::new(InMemoryIdempotencyRegistry::default());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.try_acquire("same").await.unwrap() })
            })
            .collect();

        let mut fresh = 0;
        for handle in handles {
            if handle.await.unwrap().is_fresh() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
    }
}
