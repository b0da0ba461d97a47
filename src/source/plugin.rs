//! Illustrative site plugins.
//!
//! Real plugins target a single third-party indexer site or JSON API; the
//! HTML/JSON parsing inside them is out of scope (spec §1). These variants
//! stand in for that black box: a synchronous plugin, an async plugin that
//! deliberately takes longer than the fast deadline so C4's continuation
//! path has something to exercise, and a magnet-specialized plugin that
//! bypasses the global keyword filter.

use async_trait::async_trait;
use tokio::time::sleep;

use crate::model::{ExtMap, Link, LinkType, SearchResult};
use crate::source::{Priority, SourceErrorKind, SourceOutcome, SourceWorker};

/// A plugin that returns promptly and completely.
pub struct SyncPlugin {
    name: String,
    priority: Priority,
}

impl SyncPlugin {
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        SyncPlugin {
            name: name.into(),
            priority,
        }
    }
}

#[async_trait]
impl SourceWorker for SyncPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    async fn search(&self, query: &str, _ext: &ExtMap) -> SourceOutcome {
        let unique_id = crate::model::unique_id(&format!("plugin:{}", self.name), &format!("https://{}.example/{}", self.name, query));
        let result = SearchResult {
            unique_id,
            title: format!("{query} 系列资源"),
            content: format!("来自插件 {}", self.name),
            channel: String::new(),
            datetime: Some(chrono::Utc::now()),
            tags: vec![],
            links: vec![Link {
                link_type: LinkType::Quark,
                url: format!("https://pan.quark.cn/s/{query}"),
                password: String::new(),
            }],
            source_tag: String::new(),
            priority: 0,
            score: 0,
        };
        SourceOutcome {
            results: vec![result],
            is_final: true,
            error: None,
        }
    }
}

/// A plugin whose search keeps running past the fast deadline and, once
/// complete, has additional results worth promoting into the cache (spec
/// §8 scenario 5).
pub struct AsyncPlugin {
    name: String,
    priority: Priority,
    sleep: std::time::Duration,
}

impl AsyncPlugin {
    pub fn new(name: impl Into<String>, priority: Priority, sleep: std::time::Duration) -> Self {
        AsyncPlugin {
            name: name.into(),
            priority,
            sleep,
        }
    }
}

#[async_trait]
impl SourceWorker for AsyncPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn supports_async_continuation(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, _ext: &ExtMap) -> SourceOutcome {
        sleep(self.sleep).await;
        let mut results = Vec::new();
        for i in 0..3 {
            let unique_id = crate::model::unique_id(
                &format!("plugin:{}", self.name),
                &format!("https://{}.example/{query}/{i}", self.name),
            );
            results.push(SearchResult {
                unique_id,
                title: format!("{query} 扩展结果 {i}"),
                content: format!("来自异步插件 {}", self.name),
                channel: String::new(),
                datetime: Some(chrono::Utc::now()),
                tags: vec![],
                links: vec![Link {
                    link_type: LinkType::Aliyun,
                    url: format!("https://alipan.com/s/{query}-{i}"),
                    password: String::new(),
                }],
                source_tag: String::new(),
                priority: 0,
                score: 0,
            });
        }
        SourceOutcome {
            results,
            is_final: true,
            error: None,
        }
    }
}

/// A plugin wired to always fail, for source-failure-isolation testing
/// (spec §8 scenario 6).
pub struct FailingPlugin {
    name: String,
}

impl FailingPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        FailingPlugin { name: name.into() }
    }
}

#[async_trait]
impl SourceWorker for FailingPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        Priority::Low
    }

    async fn search(&self, _query: &str, _ext: &ExtMap) -> SourceOutcome {
        SourceOutcome {
            results: vec![],
            is_final: true,
            error: Some(crate::source::SourceError {
                kind: SourceErrorKind::Other,
                plugin: self.name.clone(),
                cause: "simulated permanent failure".to_string(),
            }),
        }
    }
}

/// A magnet-specialized plugin; bypasses the global keyword filter (spec
/// §4.1/§4.6).
pub struct MagnetPlugin {
    name: String,
}

impl MagnetPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        MagnetPlugin { name: name.into() }
    }
}

#[async_trait]
impl SourceWorker for MagnetPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        Priority::Medium
    }

    fn skip_global_filter(&self) -> bool {
        true
    }

    async fn search(&self, query: &str, _ext: &ExtMap) -> SourceOutcome {
        let unique_id = crate::model::unique_id(&format!("plugin:{}", self.name), &format!("magnet:?xt=urn:btih:{query}"));
        let result = SearchResult {
            unique_id,
            title: query.to_string(),
            content: String::new(),
            channel: String::new(),
            datetime: None,
            tags: vec![],
            links: vec![Link {
                link_type: LinkType::Magnet,
                url: format!("magnet:?xt=urn:btih:{query}"),
                password: String::new(),
            }],
            source_tag: String::new(),
            priority: 0,
            score: 0,
        };
        SourceOutcome {
            results: vec![result],
            is_final: true,
            error: None,
        }
    }
}
