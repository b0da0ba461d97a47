//! C2: sharded two-tier memory+disk cache.

pub mod codec;
pub mod disk;
pub mod key;
pub mod tier;

pub use key::{build_key, SourceClass};
pub use tier::{CacheError, HitLevel, ShardedCache};
