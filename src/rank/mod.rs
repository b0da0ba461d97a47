//! C7: deterministic scoring and sort.

use chrono::Utc;

use crate::config::Config;
use crate::model::SearchResult;

/// Pure, deterministic scorer and sorter. Holds only the config-driven
/// keyword-bonus table (spec §9: data, not magic numbers).
pub struct Ranker {
    keyword_bonus_table: Vec<(String, i64)>,
}

impl Ranker {
    pub fn new(config: &Config) -> Self {
        Ranker {
            keyword_bonus_table: config.keyword_bonus_table.clone(),
        }
    }

    fn plugin_weight(priority_ordinal: u8) -> i64 {
        match priority_ordinal {
            1 => 1000,
            2 => 500,
            _ => 0,
        }
    }

    fn keyword_bonus(&self, title: &str) -> i64 {
        self.keyword_bonus_table
            .iter()
            .filter(|(phrase, _)| title.contains(phrase.as_str()))
            .map(|(_, bonus)| *bonus)
            .sum()
    }

    fn freshness_bonus(datetime: Option<chrono::DateTime<Utc>>) -> i64 {
        let Some(dt) = datetime else {
            return 0;
        };
        let age = Utc::now().signed_duration_since(dt);
        if age <= chrono::Duration::days(1) {
            500
        } else if age <= chrono::Duration::days(3) {
            400
        } else if age <= chrono::Duration::weeks(1) {
            300
        } else if age <= chrono::Duration::days(30) {
            200
        } else {
            0
        }
    }

    /// Score every result in place, reading priority directly off
    /// `result.priority` (set by the aggregator from the worker that
    /// produced it).
    pub fn score(&self, results: &mut [SearchResult]) {
        for result in results.iter_mut() {
            result.score = Self::plugin_weight(result.priority)
                + self.keyword_bonus(&result.title)
                + Self::freshness_bonus(result.datetime);
        }
    }

    /// Descending by score; tie-break by descending datetime, then
    /// ascending `unique_id` for total determinism.
    pub fn sort(&self, results: &mut Vec<SearchResult>) {
        results.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.datetime.cmp(&a.datetime))
                .then_with(|| a.unique_id.cmp(&b.unique_id))
        });
    }
}
