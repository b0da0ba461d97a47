//! C3: delayed batch write manager.
//!
//! A background-loop worker: an `AtomicBool` run flag, a `tokio::spawn`ed
//! loop, a graceful `shutdown`. Staging writes are coalesced
//! (last-write-wins) and flushed to C2 on whichever trigger fires first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::cache::ShardedCache;
use crate::model::CachedPayload;

struct StagedWrite {
    payload: CachedPayload,
    ttl: Duration,
    staged_at: Instant,
}

/// Accepts `enqueue` calls from the foreground path and flushes them to the
/// cache's disk tier on a size/time/shutdown trigger (spec §4.3).
pub struct BatchWriteManager {
    staging: DashMap<String, StagedWrite>,
    cache: Arc<ShardedCache>,
    max_batch_entries: usize,
    max_delay: Duration,
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
    oldest_staged: Mutex<Option<Instant>>,
}

impl BatchWriteManager {
    pub fn new(cache: Arc<ShardedCache>, max_batch_entries: usize, max_delay: Duration) -> Arc<Self> {
        let manager = Arc::new(BatchWriteManager {
            staging: DashMap::new(),
            cache,
            max_batch_entries,
            max_delay,
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
            oldest_staged: Mutex::new(None),
        });
        manager.clone().spawn_flush_loop();
        manager
    }

    fn spawn_flush_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            while self.running.load(Ordering::SeqCst) {
                let wait = self.max_delay;
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.notify.notified() => {}
                }
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                self.maybe_flush();
            }
        });
    }

    /// Stage a write; last-write-wins for the same key. Triggers an
    /// immediate flush if staging now exceeds `max_batch_entries`.
    pub fn enqueue(&self, key: String, payload: CachedPayload, ttl: Duration) {
        let now = Instant::now();
        self.staging.insert(
            key,
            StagedWrite {
                payload,
                ttl,
                staged_at: now,
            },
        );
        {
            let mut oldest = self.oldest_staged.lock();
            if oldest.is_none() {
                *oldest = Some(now);
            }
        }
        if self.staging.len() >= self.max_batch_entries {
            self.notify.notify_one();
        }
    }

    fn maybe_flush(&self) {
        let should_flush_on_age = self
            .oldest_staged
            .lock()
            .map(|t| t.elapsed() >= self.max_delay)
            .unwrap_or(false);
        let should_flush_on_size = self.staging.len() >= self.max_batch_entries;
        if should_flush_on_age || should_flush_on_size {
            self.flush_now();
        }
    }

    /// Move staging entries into an immutable snapshot, replace the live
    /// map, and write the snapshot via `C2.set_both`.
    fn flush_now(&self) {
        if self.staging.is_empty() {
            return;
        }
        let snapshot: HashMap<String, StagedWrite> = self
            .staging
            .iter()
            .map(|e| (e.key().clone(), StagedWrite {
                payload: e.value().payload.clone(),
                ttl: e.value().ttl,
                staged_at: e.value().staged_at,
            }))
            .collect();
        for key in snapshot.keys() {
            self.staging.remove(key);
        }
        *self.oldest_staged.lock() = None;

        for (key, staged) in snapshot {
            if let Err(e) = self.cache.set_both(&key, &staged.payload, staged.ttl) {
                tracing::warn!(key = %key, error = %e, "batch flush write failed, memory tier still authoritative");
            }
        }
    }

    /// Flush everything currently staged and stop the background loop.
    /// Returns once every previously-enqueued write is either on disk or
    /// was superseded by a newer value for the same key.
    pub async fn shutdown(&self, deadline: Duration) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
        let _ = tokio::time::timeout(deadline, async {
            self.flush_now();
        })
        .await;
    }

    #[cfg(test)]
    fn staged_len(&self) -> usize {
        self.staging.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_cache() -> Arc<ShardedCache> {
        let dir = std::env::temp_dir().join(format!("meshsearch-batch-{}", std::process::id()));
        let mut config = Config::from_env();
        config.cache_path = dir.to_string_lossy().to_string();
        config.shard_count = 4;
        Arc::new(ShardedCache::new(&config))
    }

    #[tokio::test]
    async fn size_trigger_flushes_staging() {
        let cache = test_cache();
        let manager = BatchWriteManager::new(cache.clone(), 2, Duration::from_secs(60));

        manager.enqueue("k1".into(), CachedPayload::default(), Duration::from_secs(60));
        manager.enqueue("k2".into(), CachedPayload::default(), Duration::from_secs(60));
        // size trigger notifies the flush loop; give it a moment to run.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.staged_len(), 0);
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_writes() {
        let cache = test_cache();
        let manager = BatchWriteManager::new(cache.clone(), 1000, Duration::from_secs(60));
        manager.enqueue("k1".into(), CachedPayload::default(), Duration::from_secs(60));
        manager.shutdown(Duration::from_secs(5)).await;
        assert_eq!(manager.staged_len(), 0);

        let (value, _age, level): (Option<CachedPayload>, u64, crate::cache::HitLevel) =
            cache.get("k1").unwrap();
        assert!(value.is_some());
        assert_eq!(level, crate::cache::HitLevel::Memory);
    }

    #[tokio::test]
    async fn last_write_wins_for_same_key() {
        let cache = test_cache();
        let manager = BatchWriteManager::new(cache.clone(), 1000, Duration::from_secs(60));
        let mut first = CachedPayload::default();
        first.results.push(crate::model::SearchResult {
            unique_id: "a".into(),
            title: "first".into(),
            content: String::new(),
            channel: String::new(),
            datetime: None,
            tags: vec![],
            links: vec![],
            source_tag: String::new(),
            priority: 0,
            score: 0,
        });
        let mut second = CachedPayload::default();
        second.results.push(crate::model::SearchResult {
            unique_id: "b".into(),
            title: "second".into(),
            content: String::new(),
            channel: String::new(),
            datetime: None,
            tags: vec![],
            links: vec![],
            source_tag: String::new(),
            priority: 0,
            score: 0,
        });
        manager.enqueue("k1".into(), first, Duration::from_secs(60));
        manager.enqueue("k1".into(), second, Duration::from_secs(60));
        manager.shutdown(Duration::from_secs(5)).await;

        let (value, _age, _level): (Option<CachedPayload>, u64, crate::cache::HitLevel) =
            cache.get("k1").unwrap();
        assert_eq!(value.unwrap().results[0].title, "second");
    }
}
