//! Core data model: [`SearchResult`], [`Link`], [`GroupedView`] and friends.
//!
//! Shapes mirror spec §3 exactly; field names are chosen to serialize
//! directly into the external JSON contract of spec §6.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of netdisk providers plus the non-netdisk link kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Baidu,
    Quark,
    Aliyun,
    #[serde(rename = "115")]
    Pan115,
    #[serde(rename = "123")]
    Pan123,
    Uc,
    Tianyi,
    Mobile,
    Pikpak,
    Xunlei,
    Magnet,
    Ed2k,
    Others,
}

impl LinkType {
    /// All provider variants this table knows about, most-specific pattern
    /// classification aside. Used to render the health endpoint's list and
    /// to validate `cloud_types` filters.
    pub const ALL: &'static [LinkType] = &[
        LinkType::Baidu,
        LinkType::Quark,
        LinkType::Aliyun,
        LinkType::Pan115,
        LinkType::Pan123,
        LinkType::Uc,
        LinkType::Tianyi,
        LinkType::Mobile,
        LinkType::Pikpak,
        LinkType::Xunlei,
        LinkType::Magnet,
        LinkType::Ed2k,
        LinkType::Others,
    ];

    /// Parse a provider-type filter token (`cloud_types` query values), case
    /// insensitive, matching the `rename`d wire form for numeric providers.
    pub fn parse(s: &str) -> Option<LinkType> {
        let lower = s.trim().to_ascii_lowercase();
        Some(match lower.as_str() {
            "baidu" => LinkType::Baidu,
            "quark" => LinkType::Quark,
            "aliyun" => LinkType::Aliyun,
            "115" => LinkType::Pan115,
            "123" => LinkType::Pan123,
            "uc" => LinkType::Uc,
            "tianyi" => LinkType::Tianyi,
            "mobile" => LinkType::Mobile,
            "pikpak" => LinkType::Pikpak,
            "xunlei" => LinkType::Xunlei,
            "magnet" => LinkType::Magnet,
            "ed2k" => LinkType::Ed2k,
            "others" => LinkType::Others,
            _ => return None,
        })
    }

    /// Stable wire key used as a `merged_by_type` map key.
    pub fn as_key(&self) -> &'static str {
        match self {
            LinkType::Baidu => "baidu",
            LinkType::Quark => "quark",
            LinkType::Aliyun => "aliyun",
            LinkType::Pan115 => "115",
            LinkType::Pan123 => "123",
            LinkType::Uc => "uc",
            LinkType::Tianyi => "tianyi",
            LinkType::Mobile => "mobile",
            LinkType::Pikpak => "pikpak",
            LinkType::Xunlei => "xunlei",
            LinkType::Magnet => "magnet",
            LinkType::Ed2k => "ed2k",
            LinkType::Others => "others",
        }
    }
}

/// A single share link attached to a [`SearchResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "type")]
    pub link_type: LinkType,
    pub url: String,
    #[serde(default)]
    pub password: String,
}

/// One normalized record produced by a source worker and, after ranking,
/// returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Stable per `(source, resource)` pair. Two records sharing a
    /// `unique_id` are duplicates (see [`crate::model::unique_id`]).
    pub unique_id: String,
    pub title: String,
    pub content: String,
    /// Non-empty only for Telegram-channel records.
    #[serde(default)]
    pub channel: String,
    /// Zero-value (`None`) permitted when unknown.
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub links: Vec<Link>,

    /// Scoring/bookkeeping fields, not part of the external payload but
    /// carried alongside a result through normalize → rank → merge.
    #[serde(skip)]
    pub source_tag: String,
    #[serde(skip)]
    pub priority: u8,
    #[serde(skip)]
    pub score: i64,
}

impl SearchResult {
    /// `tg:<channel>`, `plugin:<name>`, or `unknown`, per spec §3.
    pub fn compute_source_tag(channel: &str, plugin_name: &str) -> String {
        if !channel.is_empty() {
            format!("tg:{channel}")
        } else if !plugin_name.is_empty() {
            format!("plugin:{plugin_name}")
        } else {
            "unknown".to_string()
        }
    }
}

/// A flattened link entry inside a [`GroupedView`] provider bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatLink {
    pub url: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
    pub source_tag: String,
}

/// `provider_type -> ordered list of FlatLink`, built from a ranked result
/// set. Invariant: within one provider's list, no two entries share a `url`.
pub type GroupedView = HashMap<String, Vec<FlatLink>>;

/// Resolves spec §9's open question: `unique_id` is a content hash of
/// `(source_identity, stable_url)`, never a plugin-name + index pair, so it
/// stays stable and collision-free across concurrent requests.
pub fn unique_id(source_identity: &str, stable_url: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source_identity.as_bytes());
    hasher.update(b"\0");
    hasher.update(stable_url.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Opaque per-plugin options bag. Each plugin documents which keys it
/// honors; unknown keys are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<ExtValue>),
    Map(HashMap<String, ExtValue>),
}

/// `ext` request field: `string -> ExtValue`.
pub type ExtMap = HashMap<String, ExtValue>;

/// What's actually stored under a cache key: the full ranked result set,
/// cached before `res`/`cloud_types` filtering so that every view (flat,
/// grouped, or both) is derived from one shared entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CachedPayload {
    pub results: Vec<SearchResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_is_stable_and_distinct() {
        let a = unique_id("tg:channel1", "https://example.com/x");
        let b = unique_id("tg:channel1", "https://example.com/x");
        let c = unique_id("tg:channel2", "https://example.com/x");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn source_tag_prefers_channel_over_plugin() {
        assert_eq!(SearchResult::compute_source_tag("chan", "plug"), "tg:chan");
        assert_eq!(SearchResult::compute_source_tag("", "plug"), "plugin:plug");
        assert_eq!(SearchResult::compute_source_tag("", ""), "unknown");
    }

    #[test]
    fn link_type_parse_roundtrips_keys() {
        for lt in LinkType::ALL {
            let key = lt.as_key();
            assert_eq!(LinkType::parse(key).unwrap().as_key(), key);
        }
    }
}
