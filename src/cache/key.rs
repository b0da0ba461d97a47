//! Cache key derivation (spec §3 "Cache Key").
//!
//! `source_class` keeps Telegram and plugin searches in separate keyspaces
//! so that slower plugin refinements never invalidate faster Telegram hits.

use std::collections::HashMap;

use crate::model::ExtValue;

/// Which keyspace a cache entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceClass {
    Tg,
    PluginCombined,
    Plugin(String),
}

impl SourceClass {
    fn tag(&self) -> String {
        match self {
            SourceClass::Tg => "tg".to_string(),
            SourceClass::PluginCombined => "plugin_combined".to_string(),
            SourceClass::Plugin(name) => format!("plugin_{name}"),
        }
    }
}

/// Stable digest of an `ext` options bag: independent of key-insertion
/// order, sensitive to every value.
fn ext_digest(ext: &HashMap<String, ExtValue>) -> String {
    let mut keys: Vec<&String> = ext.keys().collect();
    keys.sort();
    let mut hasher = blake3::Hasher::new();
    for k in keys {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hash_ext_value(&mut hasher, &ext[k]);
        hasher.update(b";");
    }
    hasher.finalize().to_hex().to_string()
}

fn hash_ext_value(hasher: &mut blake3::Hasher, v: &ExtValue) {
    match v {
        ExtValue::Bool(b) => {
            hasher.update(if *b { b"T" } else { b"F" });
        }
        ExtValue::Int(i) => {
            hasher.update(i.to_le_bytes().as_slice());
        }
        ExtValue::Str(s) => {
            hasher.update(s.as_bytes());
        }
        ExtValue::List(items) => {
            for item in items {
                hash_ext_value(hasher, item);
                hasher.update(b",");
            }
        }
        ExtValue::Map(m) => {
            let mut keys: Vec<&String> = m.keys().collect();
            keys.sort();
            for k in keys {
                hasher.update(k.as_bytes());
                hash_ext_value(hasher, &m[k]);
            }
        }
    }
}

/// Builds the cache key for one query. Invariant: changing any input
/// changes the key (P1 in spec §8).
pub fn build_key(
    keyword: &str,
    channels: &[String],
    plugins: &[String],
    ext: &HashMap<String, ExtValue>,
    source_class: &SourceClass,
) -> String {
    let mut sorted_channels = channels.to_vec();
    sorted_channels.sort();
    let mut sorted_plugins = plugins.to_vec();
    sorted_plugins.sort();

    let mut hasher = blake3::Hasher::new();
    hasher.update(keyword.trim().to_ascii_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(sorted_channels.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(sorted_plugins.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(ext_digest(ext).as_bytes());
    hasher.update(b"|");
    hasher.update(source_class.tag().as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ext() -> HashMap<String, ExtValue> {
        HashMap::new()
    }

    #[test]
    fn differing_keyword_changes_key() {
        let a = build_key("foo", &[], &[], &empty_ext(), &SourceClass::Tg);
        let b = build_key("bar", &[], &[], &empty_ext(), &SourceClass::Tg);
        assert_ne!(a, b);
    }

    #[test]
    fn channel_order_is_irrelevant() {
        let a = build_key(
            "foo",
            &["b".into(), "a".into()],
            &[],
            &empty_ext(),
            &SourceClass::Tg,
        );
        let b = build_key(
            "foo",
            &["a".into(), "b".into()],
            &[],
            &empty_ext(),
            &SourceClass::Tg,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn source_classes_are_pairwise_distinct() {
        let tg = build_key("foo", &[], &[], &empty_ext(), &SourceClass::Tg);
        let combined = build_key("foo", &[], &[], &empty_ext(), &SourceClass::PluginCombined);
        let named = build_key(
            "foo",
            &[],
            &[],
            &empty_ext(),
            &SourceClass::Plugin("alpha".into()),
        );
        assert_ne!(tg, combined);
        assert_ne!(tg, named);
        assert_ne!(combined, named);
    }

    #[test]
    fn ext_value_changes_key() {
        let mut ext_a = HashMap::new();
        ext_a.insert("limit".to_string(), ExtValue::Int(5));
        let mut ext_b = HashMap::new();
        ext_b.insert("limit".to_string(), ExtValue::Int(6));
        let a = build_key("foo", &[], &[], &ext_a, &SourceClass::Tg);
        let b = build_key("foo", &[], &[], &ext_b, &SourceClass::Tg);
        assert_ne!(a, b);
    }

    use proptest::prelude::*;

    proptest! {
        /// P1: identical inputs always produce the identical key, and
        /// changing the keyword alone always changes it.
        #[test]
        fn build_key_is_stable_and_keyword_sensitive(
            keyword in "[a-zA-Z0-9 ]{1,20}",
            other_keyword in "[a-zA-Z0-9 ]{1,20}",
        ) {
            let ext = empty_ext();
            let a1 = build_key(&keyword, &[], &[], &ext, &SourceClass::Tg);
            let a2 = build_key(&keyword, &[], &[], &ext, &SourceClass::Tg);
            prop_assert_eq!(&a1, &a2);

            if keyword.trim().to_ascii_lowercase() != other_keyword.trim().to_ascii_lowercase() {
                let b = build_key(&other_keyword, &[], &[], &ext, &SourceClass::Tg);
                prop_assert_ne!(a1, b);
            }
        }

        /// P2: `tg`, `plugin_combined`, and `plugin_<name>` keys never
        /// collide for the same keyword/channels/plugins/ext.
        #[test]
        fn source_class_keyspaces_never_collide(
            keyword in "[a-zA-Z0-9]{1,12}",
            plugin_name in "[a-zA-Z0-9]{1,12}",
        ) {
            let ext = empty_ext();
            let tg = build_key(&keyword, &[], &[], &ext, &SourceClass::Tg);
            let combined = build_key(&keyword, &[], &[], &ext, &SourceClass::PluginCombined);
            let named = build_key(&keyword, &[], &[], &ext, &SourceClass::Plugin(plugin_name));
            prop_assert_ne!(&tg, &combined);
            prop_assert_ne!(&tg, &named);
            prop_assert_ne!(&combined, &named);
        }
    }
}
