//! Shared types for the shuttle transfer engine.
//!
//! Every value stored in a job part plan or reported in a job summary is
//! defined here so the plan, status and xfer crates agree on raw encodings.

mod ids;
mod status;
mod types;

pub use ids::{JobId, PartNumber};
pub use status::{JobStatus, Outcome, TransferStatus};
pub use types::{Direction, FromTo, JobPriority, LogLevel, TransferDetail};

/// Error returned when a raw value does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {raw}")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub raw: i64,
}
