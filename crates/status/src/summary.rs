use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use shuttle_common::{JobId, JobStatus, TransferDetail};

use crate::StatusError;

/// Running totals of a job, as reported to status callers and persisted
/// when a job is paused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub timestamp: DateTime<Utc>,
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_msg: String,
    #[serde(default)]
    pub job_status: JobStatus,
    /// Set once the part flagged as final has been created, i.e. the job is
    /// fully enumerated.
    #[serde(default)]
    pub complete_job_ordered: bool,
    #[serde(default)]
    pub total_transfers: u32,
    #[serde(default)]
    pub file_transfers: u32,
    #[serde(default)]
    pub folder_property_transfers: u32,
    #[serde(default)]
    pub transfers_completed: u32,
    #[serde(default)]
    pub transfers_failed: u32,
    #[serde(default)]
    pub transfers_skipped: u32,
    #[serde(default)]
    pub total_bytes_transferred: u64,
    #[serde(default)]
    pub total_bytes_enumerated: u64,
    #[serde(default)]
    pub total_bytes_expected: u64,
    #[serde(default)]
    pub failed_transfers: Vec<TransferDetail>,
    #[serde(default)]
    pub skipped_transfers: Vec<TransferDetail>,
}

impl JobSummary {
    /// A zeroed summary for a new job.
    pub fn new(job_id: JobId) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id,
            ..Default::default()
        }
    }

    /// A response carrying only an error, for callers that cannot produce a
    /// summary (e.g. unknown job).
    pub fn with_error(job_id: JobId, msg: impl Into<String>) -> Self {
        Self {
            error_msg: msg.into(),
            ..Self::new(job_id)
        }
    }

    /// Transfers that reached a terminal bucket.
    pub fn transfers_done(&self) -> u32 {
        self.transfers_completed
            .saturating_add(self.transfers_failed)
            .saturating_add(self.transfers_skipped)
    }

    /// Returns `true` when every enumerated transfer has an outcome.
    pub fn is_complete(&self) -> bool {
        self.complete_job_ordered && self.transfers_done() >= self.total_transfers
    }

    /// Loads a summary persisted by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, StatusError> {
        let data = std::fs::read_to_string(path)?;
        let summary: Self = serde_json::from_str(&data)?;
        debug!(
            job_id = %summary.job_id,
            transfers = summary.total_transfers,
            "loaded job summary from {:?}",
            path
        );
        Ok(summary)
    }

    /// Writes the summary to `path` as JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), StatusError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        debug!(job_id = %self.job_id, "persisted job summary to {:?}", path);
        Ok(())
    }
}

/// Counts reported when a job part is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobPartCreated {
    pub total_transfers: u32,
    pub is_final_part: bool,
    pub total_bytes_enumerated: u64,
    pub file_transfers: u32,
    pub folder_transfers: u32,
}
