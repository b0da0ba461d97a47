//! C1: the Source Worker interface.
//!
//! Uniform contract implemented by each Telegram-channel fetcher and each
//! site plugin: an `async_trait` trait object held behind `Arc<dyn
//! SourceWorker>`, stateless per call, never allowed to panic the caller.

pub mod plugin;
pub mod registry;
pub mod telegram;

use async_trait::async_trait;

use crate::model::{ExtMap, SearchResult};

/// Priority bucket driving C7's `plugin_weight` term. Telegram workers use
/// `Priority::High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High = 1,
    Medium = 2,
    Low = 3,
}

/// A recorded worker failure. Never propagated as a hard `Err` out of the
/// scheduler, surfaced instead as data in the aggregate response's internal
/// error list (spec §7: "worker errors never propagate upward").
#[derive(Debug, Clone)]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub plugin: String,
    pub cause: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Network,
    Parse,
    RateLimit,
    Timeout,
    Other,
}

/// One source's reply to a single query.
#[derive(Debug, Clone, Default)]
pub struct SourceOutcome {
    pub results: Vec<SearchResult>,
    /// `true` unless this is an async plugin that returned early with a
    /// partial result and wants to keep refining in the background.
    pub is_final: bool,
    pub error: Option<SourceError>,
}

/// Uniform contract for every source worker (spec §4.1).
#[async_trait]
pub trait SourceWorker: Send + Sync {
    /// Stable name used in `ENABLED_PLUGINS`, cache `source_class`, and
    /// `source_tag` construction.
    fn name(&self) -> &str;

    /// Scheduling priority bucket feeding the ranker's `plugin_weight`.
    fn priority(&self) -> Priority;

    /// Magnet-specialized workers skip the keyword post-filter of §4.6.
    fn skip_global_filter(&self) -> bool {
        false
    }

    /// Whether this worker may hand off to the continuation registry (C4)
    /// when it returns `is_final = false`.
    fn supports_async_continuation(&self) -> bool {
        false
    }

    /// Run the search. Must never panic; internal failures surface via
    /// `SourceOutcome::error` instead.
    async fn search(&self, query: &str, ext: &ExtMap) -> SourceOutcome;
}
