//! meshsearch: a federated netdisk/magnet search aggregator.
//!
//! - `source`: C1, the uniform worker contract (Telegram channels, plugins)
//! - `cache`: C2, the sharded two-tier memory+disk cache
//! - `batch`: C3, delayed batched disk writes
//! - `continuation`: C4, background refinement of slow plugins after response
//! - `scheduler`: C5, per-query fan-out under a deadline
//! - `normalize`, `rank`: C6/C7, result shaping and deterministic scoring
//! - `aggregator`: C8, the per-request state machine tying it all together
//! - `api`: the HTTP surface
//! - `config`, `error`, `model`, `shutdown`: ambient stack

pub mod aggregator;
pub mod api;
pub mod batch;
pub mod cache;
pub mod config;
pub mod continuation;
pub mod error;
pub mod model;
pub mod normalize;
pub mod rank;
pub mod scheduler;
pub mod shutdown;
pub mod source;

/// Crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, as declared in `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");
