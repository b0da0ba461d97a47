//! HTTP surface (spec §6): `/api/search` (GET + POST) and `/api/health`.
//!
//! Thin by design: validation and the actual pipeline live in
//! [`crate::aggregator::Aggregator`]; this module only does wire-shape
//! conversion and route wiring, split across `routes`/`handlers` the same
//! way.

pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
