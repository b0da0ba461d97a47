//! Graceful shutdown protocol (spec §5, §6.1).
//!
//! Waits for `ctrl_c` (and `SIGTERM` on unix), then runs the documented
//! sequence: stop accepting, flush the batch writer, flush memory to disk
//! as a belt-and-braces safety net. Data safety takes priority over a
//! fast shutdown.

use std::sync::Arc;
use std::time::Duration;

use crate::batch::BatchWriteManager;
use crate::cache::ShardedCache;

/// Resolves once a termination signal arrives.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Runs the documented shutdown sequence: `batch.shutdown(deadline)` then
/// `cache.flush_memory_to_disk()` as a safety net.
pub async fn run(batch: Arc<BatchWriteManager>, cache: Arc<ShardedCache>, deadline: Duration) {
    tracing::info!("shutdown signal received, draining batch writer");
    batch.shutdown(deadline).await;
    if let Err(e) = cache.flush_memory_to_disk() {
        tracing::warn!(error = %e, "flush_memory_to_disk failed during shutdown");
    }
    tracing::info!("shutdown complete");
}
