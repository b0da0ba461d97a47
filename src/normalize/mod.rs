//! C6: result normalization, link classification, and dedup.

pub mod linktype;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::model::{FlatLink, GroupedView, Link, SearchResult};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("empty keyword")]
    EmptyKeyword,
}

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?(b|i|u|em|strong|br|span|a)\b[^>]*>").unwrap());
static PWD_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]pwd=([^&#]+)").unwrap());
static PASSWORD_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[?&]password=([^&#]+)").unwrap());

/// Validates the required, non-empty `kw` request field (spec §6, §8
/// scenario 1).
pub fn validate_keyword(kw: &str) -> Result<(), NormalizeError> {
    if kw.trim().is_empty() {
        Err(NormalizeError::EmptyKeyword)
    } else {
        Ok(())
    }
}

fn strip_html_tags(s: &str) -> String {
    HTML_TAG.replace_all(s, "").trim().to_string()
}

/// Captures `?pwd=` or `password=` into the link's password field; the URL
/// itself is preserved as-is. The order between the two regexes does not
/// matter (spec §4.6): they target disjoint URL families.
fn extract_password(url: &str) -> String {
    if let Some(cap) = PWD_PARAM.captures(url) {
        return cap[1].to_string();
    }
    if let Some(cap) = PASSWORD_PARAM.captures(url) {
        return cap[1].to_string();
    }
    String::new()
}

/// Normalize one result in place: trim/strip `title`, classify + dedup its
/// links. Returns `false` if every link was dropped as unclassifiable and
/// the result carries no title either (nothing salvageable).
pub fn normalize_result(result: &mut SearchResult, source_tag: &str) {
    result.title = strip_html_tags(&result.title);
    result.content = result.content.trim().to_string();
    result.source_tag = source_tag.to_string();

    let mut classified: Vec<Link> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for link in &result.links {
        if let Some(link_type) = linktype::classify(&link.url) {
            let password = if link.password.is_empty() {
                extract_password(&link.url)
            } else {
                link.password.clone()
            };
            let dedup_key = (link_type, link.url.clone());
            if seen.insert(dedup_key) {
                classified.push(Link {
                    link_type,
                    url: link.url.clone(),
                    password,
                });
            }
        }
    }
    result.links = classified;
}

/// Case-insensitive, whitespace-tokenized keyword filter: a result passes
/// iff every token appears in `title` or `content`.
pub fn passes_keyword_filter(result: &SearchResult, keyword: &str) -> bool {
    let haystack = format!("{} {}", result.title, result.content).to_ascii_lowercase();
    keyword
        .split_whitespace()
        .map(|t| t.to_ascii_lowercase())
        .all(|token| haystack.contains(&token))
}

/// Builds the `merged_by_type` grouped view from a ranked result set.
/// Cross-result dedup key is `url`; on collision, the entry with a
/// non-empty password and the richer note wins.
pub fn build_grouped_view(results: &[SearchResult]) -> GroupedView {
    let mut by_url: HashMap<String, (String, FlatLink)> = HashMap::new();

    for result in results {
        for link in &result.links {
            let provider = link.link_type.as_key().to_string();
            let candidate = FlatLink {
                url: link.url.clone(),
                password: link.password.clone(),
                note: result.title.clone(),
                datetime: result.datetime,
                source_tag: result.source_tag.clone(),
            };
            match by_url.get(&link.url) {
                None => {
                    by_url.insert(link.url.clone(), (provider, candidate));
                }
                Some((_, existing)) => {
                    if richer(&candidate, existing) {
                        by_url.insert(link.url.clone(), (provider, candidate));
                    }
                }
            }
        }
    }

    let mut view: GroupedView = HashMap::new();
    for (_, (provider, flat)) in by_url {
        view.entry(provider).or_default().push(flat);
    }
    view
}

fn richer(candidate: &FlatLink, existing: &FlatLink) -> bool {
    let candidate_has_pwd = !candidate.password.is_empty();
    let existing_has_pwd = !existing.password.is_empty();
    if candidate_has_pwd != existing_has_pwd {
        return candidate_has_pwd;
    }
    candidate.note.len() > existing.note.len()
}
