//! The error taxonomy from §7, realized as one typed enum with one variant
//! per `Kind` row. Mirrors `exiv_shared::ExivError`'s shape: `thiserror` for
//! per-variant `Display`, a `serde` tagged representation so an error can
//! travel as the payload of an `ERROR` event without losing its kind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum CynicError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("adapter '{dog_id}' failed after retries: {reason}")]
    AdapterError { dog_id: String, reason: String },

    #[error("insufficient quorum: {votes} vote(s), need >= 2")]
    InsufficientQuorum { votes: usize },

    #[error("budget exhausted: requested {requested_usd}, remaining {remaining_usd}")]
    BudgetExhausted {
        requested_usd: f64,
        remaining_usd: f64,
    },

    #[error("event bus full (capacity {capacity})")]
    BusFull { capacity: usize },

    #[error("loop detected: event genealogy repeats ({event_type}, {source})")]
    LoopDetected { event_type: String, source: String },

    #[error("state write error: {reason}")]
    StateWriteError { reason: String },

    #[error("confidence {value} exceeds bound {bound}")]
    ConfidenceOutOfBounds { value: f64, bound: f64 },

    #[error("q_score {value} outside [0, 100]")]
    ScoreOutOfRange { value: f64 },

    #[error("invalid consciousness level: {value}")]
    InvalidLevel { value: String },

    #[error("cycle cancelled: {reason}")]
    Cancelled { reason: String },
}

pub type CynicResult<T> = Result<T, CynicError>;

impl CynicError {
    /// The `kind` string used in structured log fields and `ERROR` event
    /// payloads — stable, independent of the `Display` message.
    pub fn kind(&self) -> &'static str {
        match self {
            CynicError::InvalidInput { .. } => "InvalidInput",
            CynicError::AdapterError { .. } => "AdapterError",
            CynicError::InsufficientQuorum { .. } => "InsufficientQuorum",
            CynicError::BudgetExhausted { .. } => "BudgetExhausted",
            CynicError::BusFull { .. } => "BusFull",
            CynicError::LoopDetected { .. } => "LoopDetected",
            CynicError::StateWriteError { .. } => "StateWriteError",
            CynicError::ConfidenceOutOfBounds { .. } => "ConfidenceOutOfBounds",
            CynicError::ScoreOutOfRange { .. } => "ScoreOutOfRange",
            CynicError::InvalidLevel { .. } => "InvalidLevel",
            CynicError::Cancelled { .. } => "Cancelled",
        }
    }
}
