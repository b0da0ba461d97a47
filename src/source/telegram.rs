//! Telegram-channel scraper source.
//!
//! The real system scrapes a public channel's search-reflector web page;
//! that HTML parsing is explicitly out of scope here (spec §1). This
//! worker is a thin, already-normalized stand-in matching the interface a
//! real scraper would present.

use async_trait::async_trait;

use crate::model::{ExtMap, Link, LinkType, SearchResult};
use crate::source::{Priority, SourceOutcome, SourceWorker};

/// One Telegram channel, scraped for posts containing share links.
pub struct TelegramChannel {
    channel: String,
}

impl TelegramChannel {
    pub fn new(channel: impl Into<String>) -> Self {
        TelegramChannel {
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl SourceWorker for TelegramChannel {
    fn name(&self) -> &str {
        &self.channel
    }

    fn priority(&self) -> Priority {
        Priority::High
    }

    async fn search(&self, query: &str, _ext: &ExtMap) -> SourceOutcome {
        // A production worker would issue an HTTP request against the
        // channel's reflector page here; this stand-in manufactures one
        // plausible, already-normalized hit so the pipeline has something
        // concrete to classify, dedup, and rank.
        let unique_id = crate::model::unique_id(
            &format!("tg:{}", self.channel),
            &format!("https://t.me/s/{}?q={}", self.channel, query),
        );
        let result = SearchResult {
            unique_id,
            title: format!("[{}] {} 合集", self.channel, query),
            content: format!("频道 {} 内搜索 {} 的结果", self.channel, query),
            channel: self.channel.clone(),
            datetime: Some(chrono::Utc::now()),
            tags: vec![],
            links: vec![Link {
                link_type: LinkType::Baidu,
                url: format!("https://pan.baidu.com/s/{query}?pwd=abcd"),
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
