//! Ordered, first-match-wins URL-pattern table for link classification.
//!
//! Ordered, first-match-wins lookup: patterns are checked most-specific
//! first, the first match wins.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::LinkType;

struct Pattern {
    link_type: LinkType,
    regex: Regex,
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pat(LinkType::Baidu, r"pan\.baidu\.com"),
        pat(LinkType::Quark, r"pan\.quark\.cn"),
        pat(LinkType::Aliyun, r"(alipan\.com|aliyundrive\.com)"),
        pat(LinkType::Pan115, r"115\.com|115cdn\.com"),
        pat(LinkType::Pan123, r"123pan\.com|123684\.com|123865\.com"),
        pat(LinkType::Uc, r"drive\.uc\.cn"),
        pat(LinkType::Tianyi, r"cloud\.189\.cn"),
        pat(LinkType::Mobile, r"caiyun\.feixin\.10086\.cn"),
        pat(LinkType::Pikpak, r"mypikpak\.com"),
        pat(LinkType::Xunlei, r"pan\.xunlei\.com"),
    ]
});

fn pat(link_type: LinkType, re: &str) -> Pattern {
    Pattern {
        link_type,
        regex: Regex::new(re).expect("static link-type pattern must compile"),
    }
}

/// Classify a URL into a provider type, or `Magnet`/`Ed2k`/`Others` per
/// spec §4.6. Returns `None` when the URL isn't a well-formed http(s),
/// magnet, or ed2k URL and should be dropped.
pub fn classify(url: &str) -> Option<LinkType> {
    let lower = url.to_ascii_lowercase();

    if lower.starts_with("magnet:") {
        return Some(LinkType::Magnet);
    }
    if lower.starts_with("ed2k:") {
        return Some(LinkType::Ed2k);
    }

    for pattern in PATTERNS.iter() {
        if pattern.regex.is_match(&lower) {
            return Some(pattern.link_type);
        }
    }

    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(LinkType::Others);
    }

    None
}
