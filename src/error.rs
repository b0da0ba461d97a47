//! Top-level error taxonomy.
//!
//! Every subsystem defines its own `thiserror` enum and converts into
//! [`AggregatorError`] at the boundary. Worker and plugin failures never
//! propagate as `Err`; they are recorded as data (see `source::SourceError`)
//! and only resurface here if they escalate to a fatal, zero-result outcome.

use thiserror::Error;

use crate::cache::CacheError;
use crate::continuation::ContinuationError;
use crate::normalize::NormalizeError;
use crate::scheduler::SchedulerError;

/// Error taxonomy surfaced across the aggregation pipeline.
#[derive(Error, Debug)]
pub enum AggregatorError {
    /// Malformed or missing input (e.g. empty keyword).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// One worker failed; recorded, never fatal on its own.
    #[error("source failure: {plugin}: {cause}")]
    SourceFailure {
        /// Name of the failing source.
        plugin: String,
        /// Underlying cause, as text (sources are black boxes).
        cause: String,
    },

    /// Per-query or per-worker deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Cache disk I/O failure; memory tier remains authoritative.
    #[error("cache io error: {0}")]
    CacheIo(#[from] CacheError),

    /// Cache shard corruption; the shard was quarantined and reset empty.
    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    /// Continuation queue full; async refinement declined for this request.
    #[error("continuation saturation: {0}")]
    Saturation(#[from] ContinuationError),

    /// Aggregate failure: zero sources yielded data and at least one hard error occurred.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<SchedulerError> for AggregatorError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::AllSourcesFailed(msg) => AggregatorError::Fatal(msg),
        }
    }
}

impl From<NormalizeError> for AggregatorError {
    fn from(e: NormalizeError) -> Self {
        AggregatorError::BadRequest(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type AggregatorResult<T> = Result<T, AggregatorError>;

impl AggregatorError {
    /// HTTP status code this error maps to, per the external interface contract.
    pub fn http_status(&self) -> u16 {
        match self {
            AggregatorError::BadRequest(_) => 400,
            AggregatorError::Fatal(_) => 500,
            // every other variant is handled internally and never reaches the
            // HTTP layer as an error response; default defensively to 500.
            _ => 500,
        }
    }

    /// Numeric error code placed in the `{code, message}` error body.
    pub fn code(&self) -> i32 {
        self.http_status() as i32
    }
}
