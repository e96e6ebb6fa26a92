use std::time::{SystemTime, UNIX_EPOCH};

use shuttle_common::{FromTo, TransferDetail, TransferStatus};
use shuttle_plan::{PlanFile, TransferRecord};
use shuttle_status::JobStatusManager;

use crate::{EngineConfig, RetryPolicy, XferError};

/// Everything a strategy needs to run one transfer of a job part and record
/// its outcome.
#[derive(Clone, Copy)]
pub struct TransferContext<'a> {
    plan: &'a PlanFile,
    record: TransferRecord<'a>,
    from_to: FromTo,
    status_manager: &'a JobStatusManager,
    config: &'a EngineConfig,
}

impl<'a> TransferContext<'a> {
    pub fn new(
        plan: &'a PlanFile,
        index: u32,
        status_manager: &'a JobStatusManager,
        config: &'a EngineConfig,
    ) -> Result<Self, XferError> {
        Ok(Self {
            plan,
            record: plan.transfer(index)?,
            from_to: plan.header()?.from_to,
            status_manager,
            config,
        })
    }

    pub fn index(&self) -> u32 {
        self.record.index()
    }

    pub fn from_to(&self) -> FromTo {
        self.from_to
    }

    pub fn record(&self) -> &TransferRecord<'a> {
        &self.record
    }

    pub fn source_and_destination(&self) -> Result<(&'a str, &'a str), XferError> {
        Ok(self.plan.source_and_destination(self.record.index())?)
    }

    /// Retry policy for this transfer's direction.
    pub fn retry_policy(&self) -> &'a RetryPolicy {
        self.config.retry_policy(self.from_to)
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    /// Marks the transfer as started. Returns the status in effect, which
    /// stays `Failed` if a chunk already failed it.
    pub fn start(&self) -> TransferStatus {
        self.record.set_transfer_status(TransferStatus::Started)
    }

    /// Records the outcome of the transfer.
    ///
    /// The status is written to the plan first. Only the report that moves
    /// the transfer into a terminal state stamps the completion time and is
    /// forwarded to the job status manager; a repeated or late report (e.g. a
    /// second chunk failing, or a success after a failure) was already
    /// counted and is dropped.
    pub fn report(
        &self,
        status: TransferStatus,
        error_code: i32,
    ) -> Result<TransferStatus, XferError> {
        let transition = self.record.update_transfer_status(status);
        if !transition.entered_terminal() {
            if status.is_terminal() {
                tracing::debug!(
                    index = self.index(),
                    reported = ?status,
                    kept = ?transition.current,
                    "late transfer report ignored"
                );
            }
            return Ok(transition.current);
        }

        self.record.set_completion_time(now_nanos());
        let (src, dst) = self.source_and_destination()?;
        self.status_manager.record_transfer_done(TransferDetail {
            src: src.to_owned(),
            dst: dst.to_owned(),
            transfer_status: status,
            transfer_size: self.record.source_size(),
            error_code,
        })?;
        if status.is_failure() {
            tracing::warn!(index = self.index(), src, dst, ?status, error_code, "transfer failed");
        }
        Ok(transition.current)
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(1, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuttle_common::JobId;
    use shuttle_plan::{JobPartOrder, PlanHeader, TransferOrder};
    use shuttle_status::JobSummary;

    fn plan(from_to: FromTo) -> PlanFile {
        PlanFile::create_in_memory(&JobPartOrder {
            header: PlanHeader {
                from_to,
                ..Default::default()
            },
            transfers: vec![
                TransferOrder {
                    source: "/a/b.txt".into(),
                    destination: "container/b.txt".into(),
                    modified_time: 0,
                    source_size: 1024,
                },
                TransferOrder {
                    source: "/a/c.txt".into(),
                    destination: "container/c.txt".into(),
                    modified_time: 0,
                    source_size: 2048,
                },
            ],
        })
        .unwrap()
    }

    fn manager() -> JobStatusManager {
        JobStatusManager::with_summary(JobSummary::new(JobId::new()))
    }

    #[test]
    fn success_updates_plan_and_summary() {
        let plan = plan(FromTo::LocalBlob);
        let mgr = manager();
        let cfg = EngineConfig::default();
        let ctx = TransferContext::new(&plan, 0, &mgr, &cfg).unwrap();

        assert_eq!(ctx.start(), TransferStatus::Started);
        assert_eq!(ctx.report(TransferStatus::Success, 0).unwrap(), TransferStatus::Success);

        let record = plan.transfer(0).unwrap();
        assert_eq!(record.transfer_status().unwrap(), TransferStatus::Success);
        assert!(record.completion_time() > 0);

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.transfers_completed, 1);
        assert_eq!(s.total_bytes_transferred, 1024);
    }

    #[test]
    fn late_success_after_failure_is_dropped() {
        let plan = plan(FromTo::BlobLocal);
        let mgr = manager();
        let cfg = EngineConfig::default();
        let ctx = TransferContext::new(&plan, 1, &mgr, &cfg).unwrap();

        ctx.report(TransferStatus::Failed, 500).unwrap();
        assert_eq!(ctx.report(TransferStatus::Success, 0).unwrap(), TransferStatus::Failed);
        assert_eq!(ctx.start(), TransferStatus::Failed);

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.transfers_failed, 1);
        assert_eq!(s.transfers_completed, 0);
        assert_eq!(s.failed_transfers[0].src, "/a/c.txt");
        assert_eq!(s.failed_transfers[0].dst, "container/c.txt");
        assert_eq!(s.failed_transfers[0].error_code, 500);
        assert_eq!(s.failed_transfers[0].transfer_size, 2048);
    }

    #[test]
    fn skip_is_counted() {
        let plan = plan(FromTo::LocalBlob);
        let mgr = manager();
        let cfg = EngineConfig::default();
        let ctx = TransferContext::new(&plan, 0, &mgr, &cfg).unwrap();
        ctx.report(TransferStatus::SkippedEntityAlreadyExists, 0).unwrap();
        assert_eq!(mgr.snapshot().unwrap().transfers_skipped, 1);
    }

    #[test]
    fn retry_policy_follows_direction() {
        let plan = plan(FromTo::BlobLocal);
        let mgr = manager();
        let cfg = EngineConfig::default();
        let ctx = TransferContext::new(&plan, 0, &mgr, &cfg).unwrap();
        assert_eq!(*ctx.retry_policy(), cfg.download);
        assert_eq!(ctx.from_to(), FromTo::BlobLocal);
    }

    #[test]
    fn bad_index_rejected() {
        let plan = plan(FromTo::LocalBlob);
        let mgr = manager();
        let cfg = EngineConfig::default();
        assert!(matches!(
            TransferContext::new(&plan, 2, &mgr, &cfg),
            Err(XferError::Plan(
                shuttle_plan::PlanError::TransferIndexOutOfRange { index: 2, count: 2 }
            ))
        ));
    }

    #[test]
    fn uninitialized_manager_surfaces_error() {
        let plan = plan(FromTo::LocalBlob);
        let mgr = JobStatusManager::new();
        let cfg = EngineConfig::default();
        let ctx = TransferContext::new(&plan, 0, &mgr, &cfg).unwrap();
        assert!(matches!(
            ctx.report(TransferStatus::Success, 0),
            Err(XferError::Status(shuttle_status::StatusError::NotInitialized))
        ));
    }

    #[test]
    fn duplicate_reports_count_once() {
        let plan = plan(FromTo::LocalBlob);
        let mgr = manager();
        let cfg = EngineConfig::default();

        let failing = TransferContext::new(&plan, 0, &mgr, &cfg).unwrap();
        failing.report(TransferStatus::Failed, 500).unwrap();
        assert_eq!(failing.report(TransferStatus::Failed, 503).unwrap(), TransferStatus::Failed);

        let passing = TransferContext::new(&plan, 1, &mgr, &cfg).unwrap();
        passing.report(TransferStatus::Success, 0).unwrap();
        let stamped = plan.transfer(1).unwrap().completion_time();
        assert_eq!(passing.report(TransferStatus::Success, 0).unwrap(), TransferStatus::Success);
        assert_eq!(plan.transfer(1).unwrap().completion_time(), stamped);

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.transfers_failed, 1);
        assert_eq!(s.failed_transfers.len(), 1);
        assert_eq!(s.failed_transfers[0].error_code, 500);
        assert_eq!(s.transfers_completed, 1);
        assert_eq!(s.total_bytes_transferred, 2048);
    }

    #[test]
    fn racing_chunk_reports_count_once() {
        use std::thread;

        let plan = plan(FromTo::BlobLocal);
        let mgr = manager();
        let cfg = EngineConfig::default();
        TransferContext::new(&plan, 0, &mgr, &cfg).unwrap().start();
        thread::scope(|scope| {
            for chunk in 0..8 {
                let (plan, mgr, cfg) = (&plan, &mgr, &cfg);
                scope.spawn(move || {
                    let ctx = TransferContext::new(plan, 0, mgr, cfg).unwrap();
                    let status = if chunk % 2 == 0 {
                        TransferStatus::Failed
                    } else {
                        TransferStatus::Success
                    };
                    ctx.report(status, 0).unwrap();
                });
            }
        });

        let s = mgr.snapshot().unwrap();
        assert_eq!(s.transfers_done(), 1);
    }
}
