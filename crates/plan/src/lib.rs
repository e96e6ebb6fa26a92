//! Persistent job part plans.
//!
//! A plan is one contiguous region per job part: a fixed header, one
//! fixed-size record per transfer and a blob of path strings. Every field is
//! addressed by byte offset (see [`layout`]), so a plan written by one process
//! can be mapped again after a restart and resumed as-is.
//!
//! Workers share a [`PlanFile`] and update transfer statuses concurrently
//! through atomic words; a `Failed` transfer status can never be overwritten.

mod error;
mod file;
pub mod layout;
mod order;
mod status;

pub use error::PlanError;
pub use file::{PlanFile, TransferRecord};
pub use layout::{
    DATA_SCHEMA_VERSION, DstBlobData, DstLocalData, PlanHeader, TransferEntry, plan_file_name,
};
pub use order::{JobPartOrder, TransferOrder};
pub use status::{
    CompletionTimeCell, JobStatusCell, StatusTransition, TransferStatusCell, merge_transfer_status,
};
