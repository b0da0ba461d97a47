//! Environment-driven configuration.
//!
//! A plain struct with defaults via `Default`, loaded with a `from_env`
//! constructor rather than a config file, since the external surface here
//! is env-var only.

use std::time::Duration;

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub channels: Vec<String>,
    pub concurrency: usize,
    /// `None` = no plugins enabled; `Some(vec![])` also means none; a
    /// non-empty list is the enabled-plugin whitelist.
    pub enabled_plugins: Vec<String>,

    pub cache_enabled: bool,
    pub cache_path: String,
    pub cache_max_size: u64,
    pub cache_ttl: Duration,
    pub shard_count: usize,
    pub serializer_type: SerializerType,
    pub enable_compression: bool,
    pub min_size_to_compress: usize,

    pub async_plugin_enabled: bool,
    pub async_response_timeout: Duration,
    pub async_max_background_workers: usize,
    pub async_max_background_tasks: usize,
    pub async_cache_ttl: Duration,
    pub plugin_timeout: Duration,

    pub http_read_timeout: Duration,
    pub http_write_timeout: Duration,
    pub http_idle_timeout: Duration,
    pub http_max_conns: usize,

    pub proxy: Option<String>,

    pub keyword_bonus_table: Vec<(String, i64)>,
}

/// Pluggable cache payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerType {
    Bincode,
    Json,
}

impl SerializerType {
    fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => SerializerType::Json,
            _ => SerializerType::Bincode,
        }
    }
}

fn default_cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// the documented defaults for anything unset.
    pub fn from_env() -> Self {
        let cpu = default_cpu_count();

        let channels = env_list("CHANNELS").unwrap_or_default();
        let enabled_plugins = env_list("ENABLED_PLUGINS").unwrap_or_default();

        let async_max_background_workers =
            env_parse("ASYNC_MAX_BACKGROUND_WORKERS", (5 * cpu).max(20));
        let async_max_background_tasks = env_parse(
            "ASYNC_MAX_BACKGROUND_TASKS",
            (5 * async_max_background_workers).max(100),
        );

        Config {
            port: env_parse("PORT", 8080),
            concurrency: env_parse("CONCURRENCY", channels.len() + enabled_plugins.len() + 10),
            channels,
            enabled_plugins,

            cache_enabled: env_bool("CACHE_ENABLED", true),
            cache_path: env_string("CACHE_PATH", "./data/cache"),
            cache_max_size: env_parse("CACHE_MAX_SIZE", 512 * 1024 * 1024),
            cache_ttl: Duration::from_secs(env_parse("CACHE_TTL", 300)),
            shard_count: env_parse("SHARD_COUNT", cpu.next_power_of_two()),
            serializer_type: SerializerType::from_str(&env_string("SERIALIZER_TYPE", "bincode")),
            enable_compression: env_bool("ENABLE_COMPRESSION", true),
            min_size_to_compress: env_parse("MIN_SIZE_TO_COMPRESS", 4096),

            async_plugin_enabled: env_bool("ASYNC_PLUGIN_ENABLED", true),
            async_response_timeout: Duration::from_secs(env_parse("ASYNC_RESPONSE_TIMEOUT", 4)),
            async_max_background_workers,
            async_max_background_tasks,
            async_cache_ttl: Duration::from_secs(
                env_parse::<u64>("ASYNC_CACHE_TTL_HOURS", 24) * 3600,
            ),
            plugin_timeout: Duration::from_secs(env_parse("PLUGIN_TIMEOUT", 30)),

            http_read_timeout: Duration::from_secs(env_parse("HTTP_READ_TIMEOUT", 10)),
            http_write_timeout: Duration::from_secs(env_parse("HTTP_WRITE_TIMEOUT", 10)),
            http_idle_timeout: Duration::from_secs(env_parse("HTTP_IDLE_TIMEOUT", 60)),
            http_max_conns: env_parse("HTTP_MAX_CONNS", cpu * 64),

            proxy: std::env::var("PROXY").ok(),

            keyword_bonus_table: default_keyword_bonus_table(),
        }
    }
}

/// Open question (spec §9) resolved: the keyword-bonus table is data, not
/// magic numbers baked into the ranker.
fn default_keyword_bonus_table() -> Vec<(String, i64)> {
    vec![
        ("合集".to_string(), 420),
        ("系列".to_string(), 350),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Config::from_env()
    }
}
