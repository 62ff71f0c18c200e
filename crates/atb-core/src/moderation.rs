use std::{
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex as StdMutex},
    time::{Duration, Instant},
};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    config::{Config, WARN_LIMIT},
    domain::{ChatId, UserId},
    Error, Result,
};

/// Async lock per key; the guard is held across awaits.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    inner: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub async fn prune(&self) {
        let mut map = self.inner.lock().await;
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub type WarnKey = (ChatId, UserId);

#[derive(Clone, Copy, Debug)]
struct WarnRecord {
    count: u32,
    touched: Instant,
}

#[derive(Debug)]
pub enum WarnOutcome {
    Warned { count: u32 },
    /// Threshold reached and the ban went through; the count is back to 0.
    Banned,
    /// Threshold reached but the ban failed; the count stays at `count`.
    BanFailed { count: u32, error: Error },
}

/// Process-local warning counts per (chat, user).
///
/// Counts stay in `[0, limit)`. Entries expire after `ttl` and the oldest
/// are evicted once more than `capacity` are tracked.
#[derive(Debug)]
pub struct WarningTracker {
    limit: u32,
    ttl: Duration,
    capacity: usize,
    locks: KeyedLocks<WarnKey>,
    records: StdMutex<HashMap<WarnKey, WarnRecord>>,
}

impl WarningTracker {
    pub fn new(limit: u32, ttl: Duration, capacity: usize) -> Self {
        Self {
            limit: limit.max(1),
            ttl,
            capacity: capacity.max(1),
            locks: KeyedLocks::default(),
            records: StdMutex::new(HashMap::new()),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(WARN_LIMIT, cfg.warning_ttl, cfg.warning_capacity)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn warn<F, Fut>(&self, chat_id: ChatId, user_id: UserId, ban: F) -> WarnOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.warn_at(chat_id, user_id, Instant::now(), ban).await
    }

    /// Increment the count; at the limit run `ban` and reset only if it succeeds.
    pub async fn warn_at<F, Fut>(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        now: Instant,
        ban: F,
    ) -> WarnOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let key = (chat_id, user_id);
        let _guard = self.locks.lock(key).await;

        let count = self.current(key, now) + 1;
        if count < self.limit {
            self.store(key, count, now);
            return WarnOutcome::Warned { count };
        }

        match ban().await {
            Ok(()) => {
                self.remove(key);
                tracing::info!(chat_id = chat_id.0, user_id = user_id.0, "warn limit reached, banned");
                WarnOutcome::Banned
            }
            Err(error) => {
                let kept = self.limit - 1;
                self.store(key, kept, now);
                tracing::warn!(chat_id = chat_id.0, user_id = user_id.0, "auto-ban failed: {error}");
                WarnOutcome::BanFailed { count: kept, error }
            }
        }
    }

    pub fn check(&self, chat_id: ChatId, user_id: UserId) -> u32 {
        self.current((chat_id, user_id), Instant::now())
    }

    /// Reset to zero. Returns the previous count (0 if none).
    pub async fn reset(&self, chat_id: ChatId, user_id: UserId) -> u32 {
        let key = (chat_id, user_id);
        let _guard = self.locks.lock(key).await;
        let previous = self.current(key, Instant::now());
        self.remove(key);
        previous
    }

    /// Evict expired entries, then the oldest ones over capacity.
    pub async fn sweep_at(&self, now: Instant) -> usize {
        let evicted = {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            let before = records.len();
            let ttl = self.ttl;
            records.retain(|_, r| now.saturating_duration_since(r.touched) < ttl);

            if records.len() > self.capacity {
                let mut by_age: Vec<(WarnKey, Instant)> =
                    records.iter().map(|(k, r)| (*k, r.touched)).collect();
                by_age.sort_by_key(|(_, touched)| *touched);
                let excess = records.len() - self.capacity;
                for (key, _) in by_age.into_iter().take(excess) {
                    records.remove(&key);
                }
            }
            before - records.len()
        };
        self.locks.prune().await;
        evicted
    }

    pub fn tracked(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn current(&self, key: WarnKey, now: Instant) -> u32 {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .get(&key)
            .filter(|r| now.saturating_duration_since(r.touched) < self.ttl)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    fn store(&self, key: WarnKey, count: u32, now: Instant) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(
            key,
            WarnRecord {
                count,
                touched: now,
            },
        );
        if records.len() > self.capacity {
            if let Some(oldest) = records
                .iter()
                .filter(|(k, _)| **k != key)
                .min_by_key(|(_, r)| r.touched)
                .map(|(k, _)| *k)
            {
                records.remove(&oldest);
            }
        }
    }

    fn remove(&self, key: WarnKey) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const C: ChatId = ChatId(-1001);
    const U: UserId = UserId(42);

    fn tracker() -> WarningTracker {
        WarningTracker::new(3, Duration::from_secs(3600), 100)
    }

    #[tokio::test]
    async fn third_warning_bans_and_resets() {
        let t = tracker();
        let bans = &AtomicUsize::new(0);
        let ban = move || async move {
            bans.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        assert!(matches!(t.warn(C, U, ban).await, WarnOutcome::Warned { count: 1 }));
        assert!(matches!(t.warn(C, U, ban).await, WarnOutcome::Warned { count: 2 }));
        assert!(matches!(t.warn(C, U, ban).await, WarnOutcome::Banned));
        assert_eq!(bans.load(Ordering::SeqCst), 1);
        assert_eq!(t.check(C, U), 0);
    }

    #[tokio::test]
    async fn failed_ban_keeps_count_below_limit_and_retries() {
        let t = tracker();
        let ok = || async { Ok(()) };
        let fail = || async { Err(Error::Permission("not enough rights".to_string())) };

        t.warn(C, U, ok).await;
        t.warn(C, U, ok).await;
        match t.warn(C, U, fail).await {
            WarnOutcome::BanFailed { count, error } => {
                assert_eq!(count, 2);
                assert!(error.to_string().contains("rights"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(t.check(C, U), 2);

        assert!(matches!(t.warn(C, U, ok).await, WarnOutcome::Banned));
        assert_eq!(t.check(C, U), 0);
    }

    #[tokio::test]
    async fn reset_without_warnings_is_noop() {
        let t = tracker();
        assert_eq!(t.reset(C, U).await, 0);
        assert_eq!(t.check(C, U), 0);

        t.warn(C, U, || async { Ok(()) }).await;
        assert_eq!(t.reset(C, U).await, 1);
        assert_eq!(t.check(C, U), 0);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let t = tracker();
        let ok = || async { Ok(()) };
        t.warn(C, U, ok).await;
        t.warn(ChatId(-2), U, ok).await;
        t.warn(C, UserId(7), ok).await;
        assert_eq!(t.check(C, U), 1);
        assert_eq!(t.check(ChatId(-2), U), 1);
        assert_eq!(t.check(C, UserId(7)), 1);
    }

    #[tokio::test]
    async fn concurrent_warnings_are_serialized() {
        let t = Arc::new(WarningTracker::new(100, Duration::from_secs(3600), 100));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let t = t.clone();
            handles.push(tokio::spawn(async move {
                t.warn(C, U, || async {
                    tokio::task::yield_now().await;
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(t.check(C, U), 20);
    }

    #[tokio::test]
    async fn ban_runs_once_under_concurrency() {
        let t = Arc::new(tracker());
        let bans = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let t = t.clone();
            let bans = bans.clone();
            handles.push(tokio::spawn(async move {
                t.warn(C, U, || async move {
                    tokio::task::yield_now().await;
                    bans.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(bans.load(Ordering::SeqCst), 1);
        assert_eq!(t.check(C, U), 0);
    }

    #[tokio::test]
    async fn expired_entries_read_as_zero_and_are_swept() {
        let t = WarningTracker::new(3, Duration::from_secs(10), 100);
        let start = Instant::now();
        t.warn_at(C, U, start, || async { Ok(()) }).await;
        assert_eq!(t.tracked(), 1);

        let later = start + Duration::from_secs(11);
        assert!(matches!(
            t.warn_at(C, U, later, || async { Ok(()) }).await,
            WarnOutcome::Warned { count: 1 }
        ));

        assert_eq!(t.sweep_at(later + Duration::from_secs(11)).await, 1);
        assert_eq!(t.tracked(), 0);
        assert_eq!(t.locks.len().await, 0);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let t = WarningTracker::new(3, Duration::from_secs(3600), 2);
        let start = Instant::now();
        for (i, user) in [1, 2, 3].into_iter().enumerate() {
            t.warn_at(C, UserId(user), start + Duration::from_secs(i as u64), || async {
                Ok(())
            })
            .await;
        }
        assert_eq!(t.tracked(), 2);
        assert_eq!(t.check(C, UserId(1)), 0);
        assert_eq!(t.check(C, UserId(3)), 1);
    }
}
