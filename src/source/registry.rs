//! Explicit source registry.
//!
//! Resolves spec §9's open question: the source's file-scope side-effect
//! registration is replaced with an explicit registry, every constructor
//! listed in one place (`builtin`), register-then-list/lookup, without any
//! install-path or marketplace bookkeeping, which has no counterpart in
//! this system.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::source::plugin::{AsyncPlugin, FailingPlugin, MagnetPlugin, SyncPlugin};
use crate::source::telegram::TelegramChannel;
use crate::source::{Priority, SourceWorker};

/// Holds every constructed source worker, keyed by name, split by class
/// (Telegram channel vs. plugin) so the scheduler can apply `src` filtering
/// cheaply.
pub struct SourceRegistry {
    channels: HashMap<String, Arc<dyn SourceWorker>>,
    plugins: HashMap<String, Arc<dyn SourceWorker>>,
}

impl SourceRegistry {
    /// Construct the full set of workers this process knows about: one
    /// Telegram channel worker per `config.channels` entry, plus the fixed
    /// set of illustrative plugins, filtered down to `config.enabled_plugins`.
    pub fn builtin(config: &Config) -> Self {
        let mut channels: HashMap<String, Arc<dyn SourceWorker>> = HashMap::new();
        for channel in &config.channels {
            channels.insert(channel.clone(), Arc::new(TelegramChannel::new(channel.clone())));
        }

        let all_plugins: Vec<Arc<dyn SourceWorker>> = vec![
            Arc::new(SyncPlugin::new("quickpan", Priority::Medium)),
            Arc::new(AsyncPlugin::new("slowindex", Priority::Medium, Duration::from_secs(10))),
            Arc::new(FailingPlugin::new("brokensite")),
            Arc::new(MagnetPlugin::new("magnetdht")),
        ];

        let mut plugins: HashMap<String, Arc<dyn SourceWorker>> = HashMap::new();
        for p in all_plugins {
            let enabled = config.enabled_plugins.iter().any(|n| n == p.name());
            if enabled {
                plugins.insert(p.name().to_string(), p);
            }
        }

        SourceRegistry { channels, plugins }
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn all_plugin_names(config: &Config) -> Vec<String> {
        // static list mirrors `builtin`'s constructors; kept separate so
        // the health endpoint can report the full catalog even when none
        // are enabled.
        let _ = config;
        vec![
            "quickpan".to_string(),
            "slowindex".to_string(),
            "brokensite".to_string(),
            "magnetdht".to_string(),
        ]
    }

    /// Workers selected by `src` (`all|tg|plugin`), further filtered by the
    /// request's `channels`/`plugins` whitelists when non-empty.
    pub fn select(
        &self,
        src_filter: &str,
        requested_channels: &[String],
        requested_plugins: &[String],
    ) -> Vec<Arc<dyn SourceWorker>> {
        let mut out = Vec::new();

        if src_filter == "all" || src_filter == "tg" {
            for (name, worker) in &self.channels {
                if requested_channels.is_empty() || requested_channels.iter().any(|c| c == name) {
                    out.push(worker.clone());
                }
            }
        }

        if src_filter == "all" || src_filter == "plugin" {
            for (name, worker) in &self.plugins {
                if requested_plugins.is_empty() || requested_plugins.iter().any(|p| p == name) {
                    out.push(worker.clone());
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn src_filter_tg_excludes_plugins() {
        let mut config = Config::from_env();
        config.channels = vec!["chan1".to_string()];
        config.enabled_plugins = vec!["quickpan".to_string()];
        let registry = SourceRegistry::builtin(&config);

        let selected = registry.select("tg", &[], &[]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "chan1");
    }

    #[test]
    fn disabled_plugins_are_not_registered() {
        let mut config = Config::from_env();
        config.enabled_plugins = vec!["quickpan".to_string()];
        let registry = SourceRegistry::builtin(&config);
        assert_eq!(registry.plugin_names(), vec!["quickpan".to_string()]);
    }
}
