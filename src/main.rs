//! meshsearch entry point: loads configuration, wires every component
//! (cache, batch writer, continuation registry, scheduler, source registry,
//! aggregator), serves the HTTP API, and runs the documented graceful
//! shutdown sequence on `SIGTERM`/`Ctrl+C`.

use std::sync::Arc;
use std::time::Duration;

use meshsearch::aggregator::Aggregator;
use meshsearch::api::{self, AppState};
use meshsearch::batch::BatchWriteManager;
use meshsearch::cache::ShardedCache;
use meshsearch::config::Config;
use meshsearch::continuation::ContinuationRegistry;
use meshsearch::scheduler::QueryScheduler;
use meshsearch::shutdown;
use meshsearch::source::registry::SourceRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        version = meshsearch::VERSION,
        port = config.port,
        channels = config.channels.len(),
        plugins = config.enabled_plugins.len(),
        "starting {}",
        meshsearch::NAME
    );

    let cache = Arc::new(ShardedCache::new(&config));
    let batch = BatchWriteManager::new(cache.clone(), 256, Duration::from_secs(2));
    let continuation = Arc::new(ContinuationRegistry::new(
        cache.clone(),
        config.async_max_background_workers,
        config.async_max_background_tasks,
        config.plugin_timeout,
        config.async_cache_ttl,
    ));
    let registry = Arc::new(SourceRegistry::builtin(&config));
    let scheduler = Arc::new(QueryScheduler::new(config.concurrency));

    let aggregator = Arc::new(Aggregator::new(
        config.clone(),
        cache.clone(),
        batch.clone(),
        continuation,
        scheduler,
        registry,
    ));

    let app = api::create_router(AppState { aggregator }, &config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_signal())
        .await?;

    shutdown::run(batch, cache, config.http_write_timeout).await;
    Ok(())
}
