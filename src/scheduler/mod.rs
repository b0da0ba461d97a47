//! C5: query scheduler, fan-out across sources under a deadline.
//!
//! Modeled on `scheduling::scheduler::JobScheduler`'s spawn-and-collect
//! shape, generalized from persisted jobs to transient per-query fan-out:
//! one task per enabled source, a bounded `mpsc` channel, a deadline
//! derived `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::continuation::ContinuationRegistry;
use crate::model::ExtMap;
use crate::source::{SourceError, SourceErrorKind, SourceOutcome, SourceWorker};

/// Per-request hand-off context for async continuation (spec §4.4/§4.5):
/// carries the request's own cache key (every continuation-capable worker
/// in this fan-out promotes into the same keyspace the request itself
/// reads from) and owns the registry it hands refinement work off to once
/// the fast deadline elapses.
pub struct AsyncContinuationContext {
    pub registry: Arc<ContinuationRegistry>,
    pub async_response_timeout: Duration,
    pub promotion_cache_key: String,
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("all sources failed: {0}")]
    AllSourcesFailed(String),
}

/// One source's contribution to a fan-out, tagged with its worker name so
/// the aggregator can attribute async handoffs and errors.
pub struct SourceReply {
    pub source_name: String,
    pub outcome: SourceOutcome,
}

/// Collected result of one fan-out round.
pub struct ScheduleOutcome {
    pub replies: Vec<SourceReply>,
    pub errors: Vec<SourceError>,
}

/// Spawns one task per enabled source and collects over a bounded channel
/// under a deadline (spec §4.5).
pub struct QueryScheduler {
    concurrency: usize,
}

impl QueryScheduler {
    pub fn new(concurrency: usize) -> Self {
        QueryScheduler { concurrency }
    }

    /// Dispatch `query` to every worker in `workers`, collecting replies
    /// until all finish or `deadline` elapses, whichever comes first.
    /// Outstanding tasks are cancelled on deadline; errors are recorded,
    /// never propagated, per source. Aggregate only fails (`AllSourcesFailed`)
    /// if zero sources produced anything and at least one hard error fired.
    pub async fn dispatch(
        &self,
        query: &str,
        ext: &ExtMap,
        workers: Vec<Arc<dyn SourceWorker>>,
        deadline: Duration,
        async_ctx: Option<&AsyncContinuationContext>,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        let channel_capacity = self.concurrency.max(workers.len()).max(1);
        let (tx, mut rx) = mpsc::channel::<SourceReply>(channel_capacity);
        let cancel = CancellationToken::new();

        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            let tx = tx.clone();
            let query = query.to_string();
            let ext = ext.clone();
            let cancel = cancel.clone();

            if worker.supports_async_continuation() {
                if let Some(ctx) = async_ctx {
                    let registry = ctx.registry.clone();
                    let fast_timeout = ctx.async_response_timeout;
                    let cache_key = ctx.promotion_cache_key.clone();
                    let handle = tokio::spawn(async move {
                        tokio::select! {
                            outcome = worker.search(&query, &ext) => {
                                let _ = tx
                                    .send(SourceReply {
                                        source_name: worker.name().to_string(),
                                        outcome,
                                    })
                                    .await;
                            }
                            _ = tokio::time::sleep(fast_timeout) => {
                                // fast deadline elapsed before the plugin
                                // finished: take the interim (empty) result
                                // now and keep it running in the
                                // continuation registry.
                                let _ = registry.submit(worker.clone(), cache_key, query.clone(), ext.clone());
                                let _ = tx
                                    .send(SourceReply {
                                        source_name: worker.name().to_string(),
                                        outcome: SourceOutcome {
                                            results: vec![],
                                            is_final: false,
                                            error: None,
                                        },
                                    })
                                    .await;
                            }
                            _ = cancel.cancelled() => {}
                        }
                    });
                    handles.push(handle);
                    continue;
                }
            }

            let handle = tokio::spawn(async move {
                tokio::select! {
                    outcome = worker.search(&query, &ext) => {
                        let _ = tx
                            .send(SourceReply {
                                source_name: worker.name().to_string(),
                                outcome,
                            })
                            .await;
                    }
                    _ = cancel.cancelled() => {
                        // deadline fired; drop without sending, HTTP bodies
                        // and any held resources are released as this task
                        // unwinds out of `worker.search`.
                    }
                }
            });
            handles.push(handle);
        }
        drop(tx);

        let mut replies = Vec::new();
        let collect = async {
            while let Some(reply) = rx.recv().await {
                replies.push(reply);
            }
        };

        tokio::select! {
            _ = collect => {}
            _ = tokio::time::sleep(deadline) => {
                cancel.cancel();
            }
        }

        for handle in handles {
            handle.abort();
        }

        let mut errors = Vec::new();
        let mut out_replies = Vec::new();
        for reply in replies {
            if let Some(err) = &reply.outcome.error {
                errors.push(err.clone());
            }
            out_replies.push(reply);
        }

        let any_results = out_replies.iter().any(|r| !r.outcome.results.is_empty());
        if !any_results && errors.iter().any(|e| e.kind != SourceErrorKind::Timeout) && !errors.is_empty()
        {
            return Err(SchedulerError::AllSourcesFailed(format!(
                "{} source(s) failed, zero results",
                errors.len()
            )));
        }

        Ok(ScheduleOutcome {
            replies: out_replies,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::plugin::{FailingPlugin, SyncPlugin};
    use crate::source::Priority;
    use std::collections::HashMap;

    #[tokio::test]
    async fn collects_results_from_all_sources() {
        let scheduler = QueryScheduler::new(10);
        let workers: Vec<Arc<dyn SourceWorker>> = vec![
            Arc::new(SyncPlugin::new("a", Priority::Medium)),
            Arc::new(SyncPlugin::new("b", Priority::Medium)),
        ];
        let outcome = scheduler
            .dispatch("test", &HashMap::new(), workers, Duration::from_secs(2), None)
            .await
            .unwrap();
        assert_eq!(outcome.replies.len(), 2);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn source_failure_does_not_fail_aggregate_when_others_succeed() {
        let scheduler = QueryScheduler::new(10);
        let workers: Vec<Arc<dyn SourceWorker>> = vec![
            Arc::new(FailingPlugin::new("broken")),
            Arc::new(SyncPlugin::new("good", Priority::Medium)),
        ];
        let outcome = scheduler
            .dispatch("test", &HashMap::new(), workers, Duration::from_secs(2), None)
            .await
            .unwrap();
        assert_eq!(outcome.errors.len(), 1);
        let total_results: usize = outcome.replies.iter().map(|r| r.outcome.results.len()).sum();
        assert_eq!(total_results, 1);
    }

    #[tokio::test]
    async fn all_sources_failing_is_fatal() {
        let scheduler = QueryScheduler::new(10);
        let workers: Vec<Arc<dyn SourceWorker>> = vec![Arc::new(FailingPlugin::new("broken"))];
        let result = scheduler
            .dispatch("test", &HashMap::new(), workers, Duration::from_secs(2), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn deadline_cancels_slow_sources_and_returns_partials() {
        use crate::source::plugin::AsyncPlugin;
        let scheduler = QueryScheduler::new(10);
        let workers: Vec<Arc<dyn SourceWorker>> = vec![
            Arc::new(SyncPlugin::new("fast", Priority::Medium)),
            Arc::new(AsyncPlugin::new("slow", Priority::Medium, Duration::from_secs(30))),
        ];
        let started = std::time::Instant::now();
        let outcome = scheduler
            .dispatch("test", &HashMap::new(), workers, Duration::from_millis(200), None)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.replies.len(), 1);
        assert_eq!(outcome.replies[0].source_name, "fast");
    }
}
