//! C4: async continuation registry, background refinement of slow
//! plugins' results after the foreground response has been sent.
//!
//! Generalizes `scheduling::worker::WorkerPool`'s health/pool-stats
//! tracking to plugin continuation tasks: a `Semaphore`-gated worker pool
//! bounds concurrency, a saturation counter bounds the queue, and a
//! per-key `Mutex` linearizes promotions into C2.

pub mod task;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};

use crate::cache::ShardedCache;
use crate::continuation::task::{PluginTask, TaskState};
use crate::model::{CachedPayload, SearchResult};
use crate::source::SourceWorker;

#[derive(Error, Debug)]
pub enum ContinuationError {
    #[error("continuation queue saturated")]
    Saturated,
}

/// Bounded background-refinement pool (spec §4.4).
pub struct ContinuationRegistry {
    cache: Arc<ShardedCache>,
    semaphore: Arc<Semaphore>,
    max_tasks: usize,
    in_flight: Arc<AtomicUsize>,
    key_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    hard_timeout: Duration,
    async_ttl: Duration,
    /// In-flight task records for introspection; transient, never persisted.
    tasks: Arc<DashMap<String, PluginTask>>,
}

impl ContinuationRegistry {
    pub fn new(cache: Arc<ShardedCache>, max_workers: usize, max_tasks: usize, hard_timeout: Duration, async_ttl: Duration) -> Self {
        ContinuationRegistry {
            cache,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_tasks,
            in_flight: Arc::new(AtomicUsize::new(0)),
            key_locks: Arc::new(DashMap::new()),
            hard_timeout,
            async_ttl,
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Current task states, for diagnostics / health reporting.
    pub fn active_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Submit a background refinement. If the queue is saturated,
    /// degrades to "drop new": returns `Err` but the caller's interim
    /// result is still returned to the user (spec §4.4, §8 P9).
    pub fn submit(&self, worker: Arc<dyn SourceWorker>, cache_key: String, query: String, ext: crate::model::ExtMap) -> Result<(), ContinuationError> {
        loop {
            let current = self.in_flight.load(Ordering::SeqCst);
            if current >= self.max_tasks {
                return Err(ContinuationError::Saturated);
            }
            if self
                .in_flight
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        let cache = self.cache.clone();
        let semaphore = self.semaphore.clone();
        let key_locks = self.key_locks.clone();
        let in_flight = self.in_flight.clone();
        let tasks = self.tasks.clone();
        let hard_timeout = self.hard_timeout;
        let async_ttl = self.async_ttl;

        let task_id = uuid::Uuid::new_v4().to_string();
        tasks.insert(
            task_id.clone(),
            PluginTask::new(task_id.clone(), worker.name().to_string(), query.clone(), cache_key.clone(), hard_timeout),
        );

        tokio::spawn(async move {
            if let Some(mut t) = tasks.get_mut(&task_id) {
                t.state = TaskState::Running;
            }
            let _permit = semaphore.acquire().await;
            let run = worker.search(&query, &ext);
            match tokio::time::timeout(hard_timeout, run).await {
                Ok(outcome) => {
                    if outcome.error.is_some() {
                        if let Some(mut t) = tasks.get_mut(&task_id) {
                            t.state = TaskState::Failed;
                        }
                    } else if outcome.results.is_empty() {
                        if let Some(mut t) = tasks.get_mut(&task_id) {
                            t.state = TaskState::Complete;
                        }
                    } else {
                        if let Some(mut t) = tasks.get_mut(&task_id) {
                            t.state = TaskState::Partial;
                        }
                        promote(&cache, &key_locks, &cache_key, outcome.results, async_ttl).await;
                        if let Some(mut t) = tasks.get_mut(&task_id) {
                            t.state = TaskState::Complete;
                        }
                    }
                }
                Err(_) => {
                    if let Some(mut t) = tasks.get_mut(&task_id) {
                        t.state = TaskState::Cancelled;
                    }
                    tracing::warn!(plugin = worker.name(), "continuation task exceeded hard deadline, cancelled");
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            tasks.remove(&task_id);
        });

        Ok(())
    }
}

/// Serialize promotions for the same key through a per-key lock, merge new
/// results with the currently cached payload, and skip the write if the
/// diff is empty (spec §4.4, P6).
async fn promote(
    cache: &Arc<ShardedCache>,
    key_locks: &Arc<DashMap<String, Arc<Mutex<()>>>>,
    cache_key: &str,
    new_results: Vec<SearchResult>,
    ttl: Duration,
) {
    let lock = key_locks
        .entry(cache_key.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock().await;

    let existing: CachedPayload = cache
        .get::<CachedPayload>(cache_key)
        .ok()
        .and_then(|(v, _, _)| v)
        .unwrap_or_default();

    let merged = merge_results(&existing.results, &new_results);
    if merged.len() == existing.results.len() {
        // empty diff: skip the write, a required optimization (spec §4.4).
        return;
    }

    if let Err(e) = cache.set_both(cache_key, &CachedPayload { results: merged }, ttl) {
        tracing::warn!(key = cache_key, error = %e, "continuation promotion write failed");
    }
}

/// Dedup by `unique_id`: existing entries keep their position, new unique
/// results are appended.
fn merge_results(existing: &[SearchResult], new_results: &[SearchResult]) -> Vec<SearchResult> {
    let mut seen: HashSet<&str> = existing.iter().map(|r| r.unique_id.as_str()).collect();
    let mut merged = existing.to_vec();
    for result in new_results {
        if seen.insert(&result.unique_id) {
            merged.push(result.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::source::plugin::AsyncPlugin;
    use crate::source::Priority;

    fn test_cache() -> Arc<ShardedCache> {
        let dir = std::env::temp_dir().join(format!("meshsearch-cont-{}", std::process::id()));
        let mut config = Config::from_env();
        config.cache_path = dir.to_string_lossy().to_string();
        config.shard_count = 4;
        Arc::new(ShardedCache::new(&config))
    }

    #[tokio::test]
    async fn saturated_queue_rejects_submission() {
        let cache = test_cache();
        let registry = ContinuationRegistry::new(cache, 1, 1, Duration::from_secs(5), Duration::from_secs(60));
        let worker: Arc<dyn SourceWorker> = Arc::new(AsyncPlugin::new("slow", Priority::Medium, Duration::from_millis(500)));
        registry
            .submit(worker.clone(), "k1".into(), "q".into(), Default::default())
            .unwrap();
        let err = registry.submit(worker, "k2".into(), "q".into(), Default::default());
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn active_task_count_reflects_in_flight_work() {
        let cache = test_cache();
        let registry = ContinuationRegistry::new(cache, 5, 20, Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(registry.active_task_count(), 0);

        let worker: Arc<dyn SourceWorker> = Arc::new(AsyncPlugin::new("slow", Priority::Medium, Duration::from_millis(200)));
        registry
            .submit(worker, "k1".into(), "q".into(), Default::default())
            .unwrap();
        assert_eq!(registry.active_task_count(), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(registry.active_task_count(), 0);
    }

    #[tokio::test]
    async fn task_exceeding_hard_timeout_is_cancelled_not_promoted() {
        let cache = test_cache();
        let registry = ContinuationRegistry::new(cache.clone(), 5, 20, Duration::from_millis(50), Duration::from_secs(60));
        let worker: Arc<dyn SourceWorker> = Arc::new(AsyncPlugin::new("slow", Priority::Medium, Duration::from_secs(5)));
        registry
            .submit(worker, "k1".into(), "q".into(), Default::default())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(registry.active_task_count(), 0);
        let (value, _age, _level): (Option<CachedPayload>, u64, crate::cache::HitLevel) =
            cache.get("k1").unwrap();
        assert!(value.is_none(), "a cancelled task must not promote results into the cache");
    }

    #[tokio::test]
    async fn completed_task_promotes_into_cache() {
        let cache = test_cache();
        let registry = ContinuationRegistry::new(cache.clone(), 5, 20, Duration::from_secs(5), Duration::from_secs(60));
        let worker: Arc<dyn SourceWorker> = Arc::new(AsyncPlugin::new("slow", Priority::Medium, Duration::from_millis(50)));
        registry
            .submit(worker, "k1".into(), "q".into(), Default::default())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        let (value, _age, _level): (Option<CachedPayload>, u64, crate::cache::HitLevel) =
            cache.get("k1").unwrap();
        assert_eq!(value.unwrap().results.len(), 3);
    }

    fn result_with_id(id: &str) -> SearchResult {
        SearchResult {
            unique_id: id.into(),
            title: String::new(),
            content: String::new(),
            channel: String::new(),
            datetime: None,
            tags: vec![],
            links: vec![],
            source_tag: String::new(),
            priority: 0,
            score: 0,
        }
    }

    use proptest::prelude::*;

    proptest! {
        /// P6: a promotion's merged payload never shrinks, never grows past
        /// `existing.len() + new.len()`, and always retains every existing id.
        #[test]
        fn merge_results_is_monotonic(
            existing_ids in proptest::collection::vec("[a-z]{1,4}", 0..8),
            new_ids in proptest::collection::vec("[a-z]{1,4}", 0..8),
        ) {
            let existing: Vec<SearchResult> = existing_ids.iter().map(|id| result_with_id(id)).collect();
            let new_results: Vec<SearchResult> = new_ids.iter().map(|id| result_with_id(id)).collect();

            let merged = merge_results(&existing, &new_results);

            prop_assert!(merged.len() >= existing.len());
            prop_assert!(merged.len() <= existing.len() + new_results.len());
            for e in &existing {
                prop_assert!(merged.iter().any(|m| m.unique_id == e.unique_id));
            }
        }

        /// P6: re-merging a payload's own results into itself is a no-op.
        #[test]
        fn merge_results_empty_diff_does_not_grow(ids in proptest::collection::vec("[a-z]{1,4}", 0..8)) {
            let existing: Vec<SearchResult> = ids.iter().map(|id| result_with_id(id)).collect();
            let merged = merge_results(&existing, &existing);
            prop_assert_eq!(merged.len(), existing.len());
        }
    }
}
