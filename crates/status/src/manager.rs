use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use shuttle_common::{Outcome, TransferDetail};

use crate::{JobPartCreated, JobSummary, StatusError};

/// Folds part-creation and transfer-done events into one [`JobSummary`].
///
/// One instance per job, owned by the job manager and shared by all workers.
/// The summary is installed exactly once, either fresh or seeded from a
/// persisted summary on resume; installing it again would double count.
/// Counters and detail lists are guarded by a single lock so a snapshot never
/// observes them out of step.
#[derive(Debug, Default)]
pub struct JobStatusManager {
    summary: OnceLock<Mutex<JobSummary>>,
}

impl JobStatusManager {
    /// Creates a manager with no summary installed yet; call
    /// [`init`](Self::init) before recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager with `summary` already installed.
    pub fn with_summary(summary: JobSummary) -> Self {
        Self {
            summary: OnceLock::from(Mutex::new(summary)),
        }
    }

    /// Installs the summary to aggregate into.
    ///
    /// Fails with [`StatusError::AlreadyInitialized`] if one is installed;
    /// the installed summary is left untouched.
    pub fn init(&self, summary: JobSummary) -> Result<(), StatusError> {
        let job_id = summary.job_id;
        let seeded = summary.total_transfers;
        self.summary
            .set(Mutex::new(summary))
            .map_err(|_| StatusError::AlreadyInitialized)?;
        info!(%job_id, seeded_transfers = seeded, "job status manager initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.summary.get().is_some()
    }

    /// Adds a newly created part's counts to the totals. Counters wrap on
    /// overflow.
    pub fn record_part_created(&self, msg: JobPartCreated) -> Result<(), StatusError> {
        let mut js = self.lock()?;
        js.complete_job_ordered |= msg.is_final_part;
        js.total_transfers = js.total_transfers.wrapping_add(msg.total_transfers);
        js.file_transfers = js.file_transfers.wrapping_add(msg.file_transfers);
        js.folder_property_transfers =
            js.folder_property_transfers.wrapping_add(msg.folder_transfers);
        js.total_bytes_enumerated = js
            .total_bytes_enumerated
            .wrapping_add(msg.total_bytes_enumerated);
        js.total_bytes_expected = js
            .total_bytes_expected
            .wrapping_add(msg.total_bytes_enumerated);
        debug!(
            transfers = msg.total_transfers,
            is_final_part = msg.is_final_part,
            "job part created"
        );
        Ok(())
    }

    /// Counts a transfer outcome.
    ///
    /// Statuses that are not a success, failure or skip (e.g. `Started`) are
    /// ignored.
    pub fn record_transfer_done(&self, detail: TransferDetail) -> Result<(), StatusError> {
        let mut js = self.lock()?;
        match detail.transfer_status.outcome() {
            Some(Outcome::Success) => {
                js.transfers_completed = js.transfers_completed.wrapping_add(1);
                js.total_bytes_transferred =
                    js.total_bytes_transferred.wrapping_add(detail.transfer_size);
            }
            Some(Outcome::Failure) => {
                js.transfers_failed = js.transfers_failed.wrapping_add(1);
                js.failed_transfers.push(detail);
            }
            Some(Outcome::Skipped) => {
                js.transfers_skipped = js.transfers_skipped.wrapping_add(1);
                js.skipped_transfers.push(detail);
            }
            None => {}
        }
        Ok(())
    }

    /// Copy of the current summary, stamped with the current time and with
    /// the error message cleared.
    pub fn snapshot(&self) -> Result<JobSummary, StatusError> {
        let js = self.lock()?;
        let mut summary = js.clone();
        summary.timestamp = Utc::now();
        summary.error_msg.clear();
        Ok(summary)
    }

    fn lock(&self) -> Result<MutexGuard<'_, JobSummary>, StatusError> {
        let summary = self.summary.get().ok_or(StatusError::NotInitialized)?;
        // Each update completes under the lock, so a poisoned guard still
        // holds consistent totals.
        Ok(summary.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuttle_common::{JobId, JobStatus, TransferStatus};

    fn detail(src: &str, status: TransferStatus, size: u64) -> TransferDetail {
        TransferDetail {
            src: src.into(),
            dst: format!("container{src}"),
            transfer_status: status,
            transfer_size: size,
            error_code: 0,
        }
    }

    fn fresh() -> JobStatusManager {
        JobStatusManager::with_summary(JobSummary::new(JobId::new()))
    }

    #[test]
    fn part_created_accumulates() {
        let mgr = fresh();
        mgr.record_part_created(JobPartCreated {
            total_transfers: 150,
            is_final_part: false,
            total_bytes_enumerated: 1_000_000,
            file_transfers: 140,
            folder_transfers: 10,
        })
        .unwrap();
        assert!(!mgr.snapshot().unwrap().complete_job_ordered);

        mgr.record_part_created(JobPartCreated {
            total_transfers: 50,
            is_final_part: true,
            total_bytes_enumerated: 500_000,
            file_transfers: 50,
            folder_transfers: 0,
        })
        .unwrap();

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.total_transfers, 200);
        assert!(s.complete_job_ordered);
        assert_eq!(s.total_bytes_enumerated, 1_500_000);
        assert_eq!(s.total_bytes_expected, 1_500_000);
        assert_eq!(s.file_transfers, 190);
        assert_eq!(s.folder_property_transfers, 10);
    }

    #[test]
    fn fully_enumerated_flag_stays_set() {
        let mgr = fresh();
        for is_final_part in [true, false, false] {
            mgr.record_part_created(JobPartCreated {
                total_transfers: 1,
                is_final_part,
                ..Default::default()
            })
            .unwrap();
        }
        assert!(mgr.snapshot().unwrap().complete_job_ordered);
    }

    #[test]
    fn success_then_tier_failure() {
        let mgr = fresh();
        mgr.record_transfer_done(detail("/a", TransferStatus::Success, 1024))
            .unwrap();
        mgr.record_transfer_done(detail("/b", TransferStatus::BlobTierFailure, 2048))
            .unwrap();

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.transfers_completed, 1);
        assert_eq!(s.total_bytes_transferred, 1024);
        assert_eq!(s.transfers_failed, 1);
        assert_eq!(s.failed_transfers.len(), 1);
        assert_eq!(s.failed_transfers[0].src, "/b");
        assert!(s.skipped_transfers.is_empty());
    }

    #[test]
    fn every_variant_lands_in_one_bucket() {
        let mgr = fresh();
        let statuses = [
            TransferStatus::Failed,
            TransferStatus::TierAvailabilityCheckFailure,
            TransferStatus::BlobTierFailure,
            TransferStatus::SkippedEntityAlreadyExists,
            TransferStatus::SkippedBlobHasSnapshots,
            TransferStatus::Success,
        ];
        for (i, status) in statuses.into_iter().enumerate() {
            mgr.record_transfer_done(detail(&format!("/{i}"), status, 10))
                .unwrap();
        }
        let s = mgr.snapshot().unwrap();
        assert_eq!(s.transfers_failed, 3);
        assert_eq!(s.transfers_skipped, 2);
        assert_eq!(s.transfers_completed, 1);
        assert_eq!(s.failed_transfers.len(), 3);
        assert_eq!(s.skipped_transfers.len(), 2);
        // Failed and skipped bytes do not count as transferred.
        assert_eq!(s.total_bytes_transferred, 10);
    }

    #[test]
    fn non_terminal_statuses_ignored() {
        let mgr = fresh();
        for status in [
            TransferStatus::NotStarted,
            TransferStatus::Started,
            TransferStatus::Cancelled,
        ] {
            mgr.record_transfer_done(detail("/x", status, 99)).unwrap();
        }
        let s = mgr.snapshot().unwrap();
        assert_eq!(s.transfers_done(), 0);
        assert_eq!(s.total_bytes_transferred, 0);
    }

    #[test]
    fn double_init_keeps_first_summary() {
        let first = JobSummary {
            total_transfers: 7,
            ..JobSummary::new(JobId::new())
        };
        let mgr = JobStatusManager::new();
        assert!(!mgr.is_initialized());
        mgr.init(first.clone()).unwrap();

        let second = JobSummary {
            total_transfers: 99,
            ..JobSummary::new(JobId::new())
        };
        assert!(matches!(
            mgr.init(second),
            Err(StatusError::AlreadyInitialized)
        ));

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.job_id, first.job_id);
        assert_eq!(s.total_transfers, 7);
    }

    #[test]
    fn init_after_with_summary_fails() {
        let mgr = fresh();
        assert!(matches!(
            mgr.init(JobSummary::default()),
            Err(StatusError::AlreadyInitialized)
        ));
    }

    #[test]
    fn uninitialized_manager_rejects_events() {
        let mgr = JobStatusManager::new();
        assert!(matches!(
            mgr.record_part_created(JobPartCreated::default()),
            Err(StatusError::NotInitialized)
        ));
        assert!(matches!(
            mgr.record_transfer_done(detail("/a", TransferStatus::Success, 1)),
            Err(StatusError::NotInitialized)
        ));
        assert!(matches!(mgr.snapshot(), Err(StatusError::NotInitialized)));
    }

    #[test]
    fn seeded_summary_returned_unchanged() {
        let seed = JobSummary {
            job_status: JobStatus::Paused,
            complete_job_ordered: true,
            total_transfers: 40,
            transfers_completed: 30,
            transfers_failed: 1,
            total_bytes_transferred: 30_000,
            total_bytes_enumerated: 40_000,
            total_bytes_expected: 40_000,
            failed_transfers: vec![detail("/f", TransferStatus::Failed, 1000)],
            error_msg: "stale".into(),
            ..JobSummary::new(JobId::new())
        };
        let mgr = JobStatusManager::new();
        mgr.init(seed.clone()).unwrap();

        let snap = mgr.snapshot().unwrap();
        assert!(snap.timestamp >= seed.timestamp);
        assert!(snap.error_msg.is_empty());
        let normalized = JobSummary {
            timestamp: seed.timestamp,
            error_msg: seed.error_msg.clone(),
            ..snap
        };
        assert_eq!(normalized, seed);
    }

    #[test]
    fn snapshot_does_not_reset() {
        let mgr = fresh();
        mgr.record_transfer_done(detail("/a", TransferStatus::Success, 5))
            .unwrap();
        let a = mgr.snapshot().unwrap();
        let b = mgr.snapshot().unwrap();
        assert_eq!(a.transfers_completed, 1);
        assert_eq!(b.transfers_completed, 1);
    }

    #[test]
    fn outcome_order_does_not_matter() {
        let outcomes = vec![
            detail("/1", TransferStatus::Success, 100),
            detail("/2", TransferStatus::Failed, 200),
            detail("/3", TransferStatus::SkippedBlobHasSnapshots, 300),
            detail("/4", TransferStatus::Success, 400),
            detail("/5", TransferStatus::TierAvailabilityCheckFailure, 500),
            detail("/6", TransferStatus::SkippedEntityAlreadyExists, 600),
        ];

        let run = |order: &[usize]| {
            let mgr = fresh();
            for &i in order {
                mgr.record_transfer_done(outcomes[i].clone()).unwrap();
            }
            let mut s = mgr.snapshot().unwrap();
            s.failed_transfers.sort_by(|a, b| a.src.cmp(&b.src));
            s.skipped_transfers.sort_by(|a, b| a.src.cmp(&b.src));
            s
        };

        let forward = run(&[0, 1, 2, 3, 4, 5]);
        for order in [[5, 4, 3, 2, 1, 0], [2, 0, 5, 1, 3, 4], [1, 3, 5, 0, 2, 4]] {
            let other = run(&order);
            assert_eq!(other.transfers_completed, forward.transfers_completed);
            assert_eq!(other.transfers_failed, forward.transfers_failed);
            assert_eq!(other.transfers_skipped, forward.transfers_skipped);
            assert_eq!(other.total_bytes_transferred, forward.total_bytes_transferred);
            assert_eq!(other.failed_transfers, forward.failed_transfers);
            assert_eq!(other.skipped_transfers, forward.skipped_transfers);
        }
        assert_eq!(forward.total_bytes_transferred, 500);
    }

    #[test]
    fn concurrent_workers() {
        use std::sync::Arc;
        use std::thread;

        let mgr = Arc::new(fresh());
        let mut handles = vec![];

        for w in 0..8 {
            let m = Arc::clone(&mgr);
            handles.push(thread::spawn(move || {
                m.record_part_created(JobPartCreated {
                    total_transfers: 100,
                    is_final_part: w == 7,
                    total_bytes_enumerated: 100,
                    file_transfers: 100,
                    folder_transfers: 0,
                })
                .unwrap();
                for i in 0..100 {
                    let status = match i % 10 {
                        0 => TransferStatus::Failed,
                        1 => TransferStatus::SkippedEntityAlreadyExists,
                        _ => TransferStatus::Success,
                    };
                    m.record_transfer_done(detail(&format!("/{w}/{i}"), status, 1))
                        .unwrap();
                }
            }));
        }

        // Readers see consistent counts and lists at every point.
        for _ in 0..4 {
            let m = Arc::clone(&mgr);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let s = m.snapshot().unwrap();
                    assert_eq!(s.transfers_failed as usize, s.failed_transfers.len());
                    assert_eq!(s.transfers_skipped as usize, s.skipped_transfers.len());
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.total_transfers, 800);
        assert!(s.complete_job_ordered);
        assert_eq!(s.transfers_completed, 640);
        assert_eq!(s.transfers_failed, 80);
        assert_eq!(s.transfers_skipped, 80);
        assert_eq!(s.total_bytes_transferred, 640);
        assert!(s.is_complete());
    }

    #[test]
    fn resume_from_persisted_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("summary.json");

        let before = fresh();
        before
            .record_part_created(JobPartCreated {
                total_transfers: 2,
                is_final_part: true,
                total_bytes_enumerated: 20,
                file_transfers: 2,
                folder_transfers: 0,
            })
            .unwrap();
        before
            .record_transfer_done(detail("/a", TransferStatus::Success, 10))
            .unwrap();
        before.snapshot().unwrap().save(&path).unwrap();

        let after = JobStatusManager::new();
        after.init(JobSummary::load(&path).unwrap()).unwrap();
        after
            .record_transfer_done(detail("/b", TransferStatus::Success, 10))
            .unwrap();

        let s = after.snapshot().unwrap();
        assert_eq!(s.transfers_completed, 2);
        assert_eq!(s.total_bytes_transferred, 20);
        assert!(s.is_complete());
    }

    #[test]
    fn counters_wrap_instead_of_panicking() {
        let mgr = JobStatusManager::with_summary(JobSummary {
            total_transfers: u32::MAX - 10,
            transfers_completed: u32::MAX,
            total_bytes_enumerated: u64::MAX,
            ..JobSummary::new(JobId::new())
        });
        mgr.record_part_created(JobPartCreated {
            total_transfers: 50,
            total_bytes_enumerated: 2,
            ..Default::default()
        })
        .unwrap();
        mgr.record_transfer_done(detail("/a", TransferStatus::Success, 1)).unwrap();

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.total_transfers, 39);
        assert_eq!(s.total_bytes_enumerated, 1);
        assert_eq!(s.transfers_completed, 0);
        // The lock is still usable afterwards.
        mgr.record_transfer_done(detail("/b", TransferStatus::Failed, 1)).unwrap();
        assert_eq!(mgr.snapshot().unwrap().transfers_failed, 1);
    }
}
