//! Sharded two-tier (memory + disk) cache (C2).
//!
//! A hand-rolled multi-level cache over `DashMap` shards, narrowed down
//! to the two tiers this system needs: `K` memory shards fronting `K`
//! on-disk shards, `K` the next power
//! of two of the logical CPU count. Per-shard access goes through one lock
//! per shard; hot-counter updates never take it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::cache::codec::{Codec, CodecError};
use crate::cache::disk::{DiskShard, RawEntry};
use crate::config::Config;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("disk error: {0}")]
    Disk(#[from] crate::cache::disk::DiskError),
}

/// Which tier satisfied a `get`, or that it missed entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitLevel {
    Memory,
    Disk,
    Miss,
}

/// One cache entry as held in the memory tier (spec §3 `CacheEntry`).
#[derive(Clone)]
struct MemEntry {
    payload: Vec<u8>,
    created_at: u64,
    ttl: Duration,
    last_access: Arc<AtomicU64>,
}

impl MemEntry {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.created_at + self.ttl.as_secs()
    }

    fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }
}

struct Shard {
    memory: DashMap<String, MemEntry>,
    disk: Mutex<DiskShard>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The cache singleton: constructed once in `main.rs` and shared by
/// reference into the scheduler, batch manager, and continuation registry
/// (resolving spec §9's "shared global cache manager" open question).
pub struct ShardedCache {
    shards: Vec<Shard>,
    codec: Codec,
    shard_count: usize,
    /// Per-shard share of `CACHE_MAX_SIZE` (spec §4.2); `evict_if_over`
    /// runs against this bound after every memory write.
    max_shard_bytes: u64,
}

fn shard_index(key: &str, shard_count: usize) -> usize {
    let hash = blake3::hash(key.as_bytes());
    let bytes = hash.as_bytes();
    let mixed = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    (mixed as usize) & (shard_count - 1)
}

impl ShardedCache {
    pub fn new(config: &Config) -> Self {
        let shard_count = config.shard_count.next_power_of_two().max(1);
        let base_dir = PathBuf::from(&config.cache_path);
        let shards = (0..shard_count)
            .map(|i| Shard {
                memory: DashMap::new(),
                disk: Mutex::new(DiskShard::new(&base_dir, i)),
            })
            .collect();
        let codec = Codec::new(
            config.serializer_type,
            config.enable_compression,
            config.min_size_to_compress,
        );
        let max_shard_bytes = (config.cache_max_size / shard_count as u64).max(1);
        ShardedCache {
            shards,
            codec,
            shard_count,
            max_shard_bytes,
        }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        &self.shards[shard_index(key, self.shard_count)]
    }

    /// Memory first, then disk on memory miss; a disk hit promotes into
    /// memory with its residual TTL.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<(Option<T>, u64, HitLevel), CacheError> {
        let shard = self.shard_for(key);
        let now = now_secs();

        if let Some(entry) = shard.memory.get(key) {
            if !entry.is_expired(now) {
                entry.last_access.store(now, Ordering::Relaxed);
                let age = now.saturating_sub(entry.created_at);
                let value = self.codec.decode(&entry.payload)?;
                return Ok((Some(value), age, HitLevel::Memory));
            }
        }

        let raw = {
            let disk = shard.disk.lock();
            disk.load_or_quarantine().get(key).cloned()
        };

        if let Some(raw) = raw {
            let expires_at = raw.created_at + raw.ttl_secs;
            if now < expires_at {
                let residual = Duration::from_secs(expires_at - now);
                shard.memory.insert(
                    key.to_string(),
                    MemEntry {
                        payload: raw.bytes.clone(),
                        created_at: raw.created_at,
                        ttl: residual,
                        last_access: Arc::new(AtomicU64::new(now)),
                    },
                );
                let age = now.saturating_sub(raw.created_at);
                let value = self.codec.decode(&raw.bytes)?;
                return Ok((Some(value), age, HitLevel::Disk));
            }
        }

        Ok((None, 0, HitLevel::Miss))
    }

    /// Fast write used inside the foreground path; disk write is deferred
    /// to the batch write manager (C3).
    pub fn set_memory<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let payload = self.codec.encode(value)?;
        let now = now_secs();
        let shard = self.shard_for(key);
        shard.memory.insert(
            key.to_string(),
            MemEntry {
                payload,
                created_at: now,
                ttl,
                last_access: Arc::new(AtomicU64::new(now)),
            },
        );
        self.evict_if_over(self.max_shard_bytes);
        Ok(())
    }

    /// Synchronous dual-tier write, used by C4 on final promotion and by
    /// C3 on batch flush.
    pub fn set_both<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
        let payload = self.codec.encode(value)?;
        let now = now_secs();
        let shard = self.shard_for(key);
        shard.memory.insert(
            key.to_string(),
            MemEntry {
                payload: payload.clone(),
                created_at: now,
                ttl,
                last_access: Arc::new(AtomicU64::new(now)),
            },
        );
        let disk = shard.disk.lock();
        let mut entries = disk.load_or_quarantine();
        entries.insert(
            key.to_string(),
            RawEntry {
                created_at: now,
                ttl_secs: ttl.as_secs(),
                bytes: payload,
            },
        );
        disk.write_all(&entries)?;
        self.evict_if_over(self.max_shard_bytes);
        Ok(())
    }

    /// Idempotent: copies every currently-present memory entry to disk,
    /// preserving original TTLs. Used as a shutdown safety net.
    pub fn flush_memory_to_disk(&self) -> Result<(), CacheError> {
        for shard in &self.shards {
            if shard.memory.is_empty() {
                continue;
            }
            let disk = shard.disk.lock();
            let mut entries = disk.load_or_quarantine();
            for item in shard.memory.iter() {
                entries.insert(
                    item.key().clone(),
                    RawEntry {
                        created_at: item.value().created_at,
                        ttl_secs: item.value().ttl.as_secs(),
                        bytes: item.value().payload.clone(),
                    },
                );
            }
            disk.write_all(&entries)?;
        }
        Ok(())
    }

    /// LRU eviction by `last_access` at the shard level, ties broken by
    /// oldest `created_at`.
    pub fn evict_if_over(&self, max_size_bytes: u64) {
        for shard in &self.shards {
            let total: u64 = shard.memory.iter().map(|e| e.size_bytes()).sum();
            if total <= max_size_bytes {
                continue;
            }
            let mut candidates: Vec<(String, u64, u64, u64)> = shard
                .memory
                .iter()
                .map(|e| {
                    (
                        e.key().clone(),
                        e.value().last_access.load(Ordering::Relaxed),
                        e.value().created_at,
                        e.value().size_bytes(),
                    )
                })
                .collect();
            candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

            let mut freed = 0u64;
            let mut need = total - max_size_bytes;
            for (key, _, _, size) in candidates {
                if need == 0 {
                    break;
                }
                shard.memory.remove(&key);
                freed += size;
                need = need.saturating_sub(size);
            }
            let _ = freed;
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
    struct Payload {
        n: u32,
    }

    fn test_config(path: &std::path::Path) -> Config {
        let mut cfg = Config::from_env();
        cfg.cache_path = path.to_string_lossy().to_string();
        cfg.shard_count = 4;
        cfg
    }

    #[test]
    fn set_both_then_get_returns_value() {
        let dir = std::env::temp_dir().join(format!("meshsearch-tier-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let cache = ShardedCache::new(&test_config(&dir));

        cache.set_both("k", &Payload { n: 42 }, Duration::from_secs(60)).unwrap();
        let (value, age, level): (Option<Payload>, u64, HitLevel) = cache.get("k").unwrap();
        assert_eq!(value, Some(Payload { n: 42 }));
        assert_eq!(level, HitLevel::Memory);
        assert!(age < 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn disk_hit_promotes_to_memory() {
        let dir = std::env::temp_dir().join(format!("meshsearch-tier-promote-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let cache = ShardedCache::new(&test_config(&dir));

        cache.set_both("k", &Payload { n: 7 }, Duration::from_secs(60)).unwrap();
        // simulate a cold memory tier (e.g. after a restart) by rebuilding
        // the cache object while the disk file is retained.
        let cache2 = ShardedCache::new(&test_config(&dir));
        let (value, _age, level): (Option<Payload>, u64, HitLevel) = cache2.get("k").unwrap();
        assert_eq!(value, Some(Payload { n: 7 }));
        assert_eq!(level, HitLevel::Disk);

        let (_value, _age, level2): (Option<Payload>, u64, HitLevel) = cache2.get("k").unwrap();
        assert_eq!(level2, HitLevel::Memory);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn miss_returns_none() {
        let dir = std::env::temp_dir().join(format!("meshsearch-tier-miss-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let cache = ShardedCache::new(&test_config(&dir));
        let (value, _age, level): (Option<Payload>, u64, HitLevel) = cache.get("nope").unwrap();
        assert_eq!(value, None);
        assert_eq!(level, HitLevel::Miss);
    }

    #[test]
    fn shard_count_is_power_of_two() {
        let dir = std::env::temp_dir().join(format!("meshsearch-tier-shards-{}", std::process::id()));
        let cache = ShardedCache::new(&test_config(&dir));
        assert!(cache.shard_count().is_power_of_two());
    }

    #[test]
    fn memory_tier_stays_bounded_by_cache_max_size() {
        let dir = std::env::temp_dir().join(format!("meshsearch-tier-evict-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut cfg = test_config(&dir);
        cfg.shard_count = 1;
        cfg.cache_max_size = 16;
        let cache = ShardedCache::new(&cfg);

        for i in 0..8u32 {
            cache
                .set_memory(&format!("k{i}"), &Payload { n: i }, Duration::from_secs(60))
                .unwrap();
        }

        let present = (0..8u32)
            .filter(|i| {
                let (value, _age, level): (Option<Payload>, u64, HitLevel) =
                    cache.get(&format!("k{i}")).unwrap();
                level == HitLevel::Memory && value.is_some()
            })
            .count();

        assert!(present < 8, "eviction never ran: all 8 entries still resident");
        assert!(present >= 1, "eviction removed everything, not just the excess");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
