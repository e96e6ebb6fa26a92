//! Transfer dispatch and the contract between the transfer pipeline and
//! the job part plan.
//!
//! The pipeline (chunking, retries, pacing, network I/O) lives outside this
//! crate. It selects a [`TransferStrategy`] for a part's [`FromTo`], honours
//! the [`RetryPolicy`] and pacer interval configured in [`EngineConfig`], and
//! records every outcome through a [`TransferContext`].
//!
//! [`FromTo`]: shuttle_common::FromTo

mod config;
mod context;
mod dispatch;

pub use config::{
    DOWNLOAD_RETRY_POLICY, EngineConfig, PACER_TIME_TO_WAIT, RetryPolicy, UPLOAD_RETRY_POLICY,
};
pub use context::TransferContext;
pub use dispatch::{Selection, StrategyTable, TransferStrategy};

/// Errors produced by the xfer crate.
#[derive(Debug, thiserror::Error)]
pub enum XferError {
    #[error("unrecognized from-to: {0}")]
    UnrecognizedFromTo(String),

    #[error("plan error: {0}")]
    Plan(#[from] shuttle_plan::PlanError),

    #[error("status error: {0}")]
    Status(#[from] shuttle_status::StatusError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
