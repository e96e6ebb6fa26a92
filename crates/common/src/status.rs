use serde::{Deserialize, Serialize};

use crate::UnknownValue;

/// Status of a whole job part, stored as a 32-bit word in the plan header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    InProgress,
    Paused,
    Cancelling,
    Cancelled,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    pub const fn as_raw(self) -> u32 {
        match self {
            JobStatus::InProgress => 0,
            JobStatus::Paused => 1,
            JobStatus::Cancelling => 2,
            JobStatus::Cancelled => 3,
            JobStatus::Completed => 4,
            JobStatus::CompletedWithErrors => 5,
            JobStatus::Failed => 6,
        }
    }

    /// Returns `true` once the job can no longer make progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled
                | JobStatus::Completed
                | JobStatus::CompletedWithErrors
                | JobStatus::Failed
        )
    }
}

impl TryFrom<u32> for JobStatus {
    type Error = UnknownValue;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => JobStatus::InProgress,
            1 => JobStatus::Paused,
            2 => JobStatus::Cancelling,
            3 => JobStatus::Cancelled,
            4 => JobStatus::Completed,
            5 => JobStatus::CompletedWithErrors,
            6 => JobStatus::Failed,
            _ => {
                return Err(UnknownValue {
                    kind: "job status",
                    raw: raw.into(),
                });
            }
        })
    }
}

/// Status of a single transfer, stored as a signed 32-bit word in its
/// transfer record. Negative values are terminal non-success outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    #[default]
    NotStarted,
    Started,
    Success,
    Failed,
    BlobTierFailure,
    SkippedEntityAlreadyExists,
    SkippedBlobHasSnapshots,
    TierAvailabilityCheckFailure,
    Cancelled,
}

/// The bucket a terminal transfer status is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
}

impl TransferStatus {
    pub const fn as_raw(self) -> i32 {
        match self {
            TransferStatus::NotStarted => 0,
            TransferStatus::Started => 1,
            TransferStatus::Success => 2,
            TransferStatus::Failed => -1,
            TransferStatus::BlobTierFailure => -2,
            TransferStatus::SkippedEntityAlreadyExists => -3,
            TransferStatus::SkippedBlobHasSnapshots => -4,
            TransferStatus::TierAvailabilityCheckFailure => -5,
            TransferStatus::Cancelled => -6,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TransferStatus::Failed
                | TransferStatus::BlobTierFailure
                | TransferStatus::TierAvailabilityCheckFailure
        )
    }

    pub fn is_skipped(self) -> bool {
        matches!(
            self,
            TransferStatus::SkippedEntityAlreadyExists | TransferStatus::SkippedBlobHasSnapshots
        )
    }

    /// Returns `true` for every status a transfer ends in.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::NotStarted | TransferStatus::Started)
    }

    /// Classifies the status into an aggregation bucket.
    ///
    /// `Cancelled` is terminal but belongs to no bucket: a cancelled transfer
    /// is neither counted as done nor reported as failed.
    pub fn outcome(self) -> Option<Outcome> {
        if self == TransferStatus::Success {
            Some(Outcome::Success)
        } else if self.is_failure() {
            Some(Outcome::Failure)
        } else if self.is_skipped() {
            Some(Outcome::Skipped)
        } else {
            None
        }
    }
}

impl TryFrom<i32> for TransferStatus {
    type Error = UnknownValue;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => TransferStatus::NotStarted,
            1 => TransferStatus::Started,
            2 => TransferStatus::Success,
            -1 => TransferStatus::Failed,
            -2 => TransferStatus::BlobTierFailure,
            -3 => TransferStatus::SkippedEntityAlreadyExists,
            -4 => TransferStatus::SkippedBlobHasSnapshots,
            -5 => TransferStatus::TierAvailabilityCheckFailure,
            -6 => TransferStatus::Cancelled,
            _ => {
                return Err(UnknownValue {
                    kind: "transfer status",
                    raw: raw.into(),
                });
            }
        })
    }
}
