//! Job status aggregation.
//!
//! Workers report part creation and transfer outcomes to a shared
//! [`JobStatusManager`], which keeps the running [`JobSummary`] of the job.
//! On resume the manager is seeded from the summary persisted when the job
//! was paused instead of replaying every transfer.

mod error;
mod manager;
mod summary;

pub use error::StatusError;
pub use manager::JobStatusManager;
pub use summary::{JobPartCreated, JobSummary};
