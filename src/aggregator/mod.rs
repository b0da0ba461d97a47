//! C8: the aggregator/merger, owning the other components and implementing
//! the per-request state machine of spec §4.8.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::BatchWriteManager;
use crate::cache::{build_key, HitLevel, ShardedCache, SourceClass};
use crate::config::Config;
use crate::continuation::ContinuationRegistry;
use crate::error::{AggregatorError, AggregatorResult};
use crate::model::{CachedPayload, ExtMap, GroupedView, SearchResult};
use crate::normalize;
use crate::rank::Ranker;
use crate::scheduler::{AsyncContinuationContext, QueryScheduler};
use crate::source::registry::SourceRegistry;
use crate::source::Priority;

/// Parsed, validated request parameters (spec §6).
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub keyword: String,
    pub channels: Vec<String>,
    pub concurrency: Option<usize>,
    pub refresh: bool,
    pub res: ResMode,
    pub src: SrcFilter,
    pub plugins: Vec<String>,
    pub cloud_types: Vec<String>,
    pub ext: ExtMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResMode {
    All,
    Results,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcFilter {
    All,
    Tg,
    Plugin,
}

impl SrcFilter {
    fn as_str(&self) -> &'static str {
        match self {
            SrcFilter::All => "all",
            SrcFilter::Tg => "tg",
            SrcFilter::Plugin => "plugin",
        }
    }
}

/// The response payload shape of spec §6, before JSON encoding.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub total: usize,
    pub results: Option<Vec<SearchResult>>,
    pub merged_by_type: Option<GroupedView>,
}

pub struct Aggregator {
    config: Config,
    cache: Arc<ShardedCache>,
    batch: Arc<BatchWriteManager>,
    continuation: Arc<ContinuationRegistry>,
    scheduler: Arc<QueryScheduler>,
    registry: Arc<SourceRegistry>,
    ranker: Ranker,
}

impl Aggregator {
    pub fn new(
        config: Config,
        cache: Arc<ShardedCache>,
        batch: Arc<BatchWriteManager>,
        continuation: Arc<ContinuationRegistry>,
        scheduler: Arc<QueryScheduler>,
        registry: Arc<SourceRegistry>,
    ) -> Self {
        let ranker = Ranker::new(&config);
        Aggregator {
            config,
            cache,
            batch,
            continuation,
            scheduler,
            registry,
            ranker,
        }
    }

    pub fn source_registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Count of continuation tasks (C4) currently in flight, for the health
    /// endpoint.
    pub fn active_background_tasks(&self) -> usize {
        self.continuation.active_task_count()
    }

    fn source_class(&self, req: &SearchRequest) -> SourceClass {
        match req.src {
            SrcFilter::Tg => SourceClass::Tg,
            SrcFilter::Plugin if req.plugins.len() == 1 => {
                SourceClass::Plugin(req.plugins[0].clone())
            }
            SrcFilter::Plugin => SourceClass::PluginCombined,
            SrcFilter::All => SourceClass::PluginCombined,
        }
    }

    /// Runs the full `received -> key_built -> cache_lookup -> ... ->
    /// return` pipeline for one request.
    pub async fn search(&self, req: SearchRequest) -> AggregatorResult<SearchResponse> {
        normalize::validate_keyword(&req.keyword)
            .map_err(|_| AggregatorError::BadRequest("关键词不能为空".to_string()))?;

        let source_class = self.source_class(&req);
        let cache_key = build_key(&req.keyword, &req.channels, &req.plugins, &req.ext, &source_class);

        if !req.refresh && self.config.cache_enabled {
            if let Ok((Some(payload), _age, level)) = self.cache.get::<CachedPayload>(&cache_key) {
                if level != HitLevel::Miss {
                    return Ok(self.build_response(&req, payload.results));
                }
            }
        }

        let workers = self.registry.select(req.src.as_str(), &req.channels, &req.plugins);
        let _concurrency = req.concurrency.unwrap_or(self.config.concurrency);
        // The per-query deadline D (spec §4.5) isn't its own env var; the
        // HTTP write timeout already bounds how long a handler may run
        // before the response must be flushed, so it doubles as D here.
        let deadline = self.config.http_write_timeout;

        let cache_key_for_cache = cache_key.clone();
        // Promotions must land in the exact keyspace this request (and any
        // later request with the same parameters) actually reads from,
        // mirroring `source_class()` rather than a per-plugin key a default
        // `src=all`/multi-plugin query would never look up.
        let async_ctx = AsyncContinuationContext {
            registry: self.continuation.clone(),
            async_response_timeout: self.config.async_response_timeout,
            promotion_cache_key: cache_key.clone(),
        };
        let async_ctx = if self.config.async_plugin_enabled {
            Some(async_ctx)
        } else {
            None
        };

        let outcome = self
            .scheduler
            .dispatch(&req.keyword, &req.ext, workers, deadline, async_ctx.as_ref())
            .await?;

        let all_workers = self.registry.select("all", &[], &[]);

        let mut results: Vec<SearchResult> = Vec::new();
        for reply in outcome.replies {
            let worker = all_workers.iter().find(|w| w.name() == reply.source_name);
            let skip_filter = worker.map(|w| w.skip_global_filter()).unwrap_or(false);
            let priority_ordinal = worker.map(|w| w.priority() as u8).unwrap_or(Priority::Low as u8);

            for mut result in reply.outcome.results {
                let source_tag = SearchResult::compute_source_tag(&result.channel, if result.channel.is_empty() { &reply.source_name } else { "" });
                normalize::normalize_result(&mut result, &source_tag);
                result.priority = priority_ordinal;
                if skip_filter || normalize::passes_keyword_filter(&result, &req.keyword) {
                    results.push(result);
                }
            }
        }

        self.ranker.score(&mut results);
        self.ranker.sort(&mut results);

        let payload = CachedPayload {
            results: results.clone(),
        };
        if self.config.cache_enabled {
            self.batch
                .enqueue(cache_key_for_cache.clone(), payload.clone(), self.config.cache_ttl);
            if req.refresh {
                // refresh bypasses the read but must still overwrite the
                // entry promptly rather than waiting on the batch window.
                if let Err(e) = self.cache.set_both(&cache_key_for_cache, &payload, self.config.cache_ttl) {
                    tracing::warn!(error = %e, "refresh write-through failed");
                }
            }
        }

        Ok(self.build_response(&req, results))
    }

    fn build_response(&self, req: &SearchRequest, mut results: Vec<SearchResult>) -> SearchResponse {
        if !req.cloud_types.is_empty() {
            let allowed: std::collections::HashSet<&str> = req.cloud_types.iter().map(|s| s.as_str()).collect();
            results.retain(|r| r.links.iter().any(|l| allowed.contains(l.link_type.as_key())));
        }

        let total = results.len();
        let include_results = matches!(req.res, ResMode::All | ResMode::Results);
        let include_merge = matches!(req.res, ResMode::All | ResMode::Merge);

        let merged_by_type = if include_merge {
            let mut view = normalize::build_grouped_view(&results);
            if !req.cloud_types.is_empty() {
                let allowed: std::collections::HashSet<&str> = req.cloud_types.iter().map(|s| s.as_str()).collect();
                view.retain(|k, _| allowed.contains(k.as_str()));
            }
            Some(view)
        } else {
            None
        };

        SearchResponse {
            total,
            results: if include_results { Some(results) } else { None },
            merged_by_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let dir = std::env::temp_dir().join(format!("meshsearch-agg-{}", std::process::id()));
        let mut cfg = Config::from_env();
        cfg.cache_path = dir.to_string_lossy().to_string();
        cfg.shard_count = 4;
        cfg.channels = vec![];
        cfg.enabled_plugins = vec!["quickpan".to_string(), "brokensite".to_string()];
        cfg
    }

    fn build_aggregator(config: Config) -> Aggregator {
        let cache = Arc::new(ShardedCache::new(&config));
        let batch = BatchWriteManager::new(cache.clone(), 1000, Duration::from_secs(60));
        let continuation = Arc::new(ContinuationRegistry::new(
            cache.clone(),
            config.async_max_background_workers,
            config.async_max_background_tasks,
            config.plugin_timeout,
            config.async_cache_ttl,
        ));
        let registry = Arc::new(SourceRegistry::builtin(&config));
        let scheduler = Arc::new(QueryScheduler::new(config.concurrency));
        Aggregator::new(config, cache, batch, continuation, scheduler, registry)
    }

    #[tokio::test]
    async fn empty_keyword_is_bad_request() {
        let aggregator = build_aggregator(test_config());
        let req = SearchRequest {
            keyword: "".into(),
            channels: vec![],
            concurrency: None,
            refresh: false,
            res: ResMode::Merge,
            src: SrcFilter::All,
            plugins: vec![],
            cloud_types: vec![],
            ext: HashMap::new(),
        };
        let err = aggregator.search(req).await.unwrap_err();
        assert!(matches!(err, AggregatorError::BadRequest(_)));
    }

    #[tokio::test]
    async fn source_failure_does_not_prevent_a_200_equivalent_response() {
        let aggregator = build_aggregator(test_config());
        let req = SearchRequest {
            keyword: "foo".into(),
            channels: vec![],
            concurrency: None,
            refresh: false,
            res: ResMode::Results,
            src: SrcFilter::Plugin,
            plugins: vec!["quickpan".into(), "brokensite".into()],
            cloud_types: vec![],
            ext: HashMap::new(),
        };
        let resp = aggregator.search(req).await.unwrap();
        assert_eq!(resp.total, 1);
    }
}
