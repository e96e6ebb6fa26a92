use std::fmt;
use std::sync::Arc;

use tracing::{error, warn};

use shuttle_common::FromTo;

use crate::{TransferContext, XferError};

/// Executes the transfers of one kind of part. Implemented by the network
/// layer.
pub trait TransferStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, ctx: &TransferContext<'_>) -> Result<(), XferError>;
}

/// Result of a strategy lookup.
#[derive(Clone)]
pub enum Selection {
    Strategy(Arc<dyn TransferStrategy>),
    /// A known combination with no implementation yet.
    NotSupported(FromTo),
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Strategy(s) => f.debug_tuple("Strategy").field(&s.name()).finish(),
            Selection::NotSupported(ft) => f.debug_tuple("NotSupported").field(ft).finish(),
        }
    }
}

/// Maps a part's [`FromTo`] to the strategy that moves its bytes.
pub struct StrategyTable {
    blob_to_local: Arc<dyn TransferStrategy>,
    local_to_blob: Arc<dyn TransferStrategy>,
}

impl StrategyTable {
    pub fn new(
        blob_to_local: Arc<dyn TransferStrategy>,
        local_to_blob: Arc<dyn TransferStrategy>,
    ) -> Self {
        Self {
            blob_to_local,
            local_to_blob,
        }
    }

    /// Looks up the strategy for `from_to`.
    ///
    /// File share transfers are known but not implemented and yield
    /// [`Selection::NotSupported`]. Any other combination never reaches the
    /// engine from a valid order and is an error.
    pub fn select(&self, from_to: FromTo) -> Result<Selection, XferError> {
        match from_to {
            FromTo::BlobLocal => Ok(Selection::Strategy(Arc::clone(&self.blob_to_local))),
            FromTo::LocalBlob => Ok(Selection::Strategy(Arc::clone(&self.local_to_blob))),
            FromTo::FileLocal | FromTo::LocalFile => {
                warn!(%from_to, "transfer kind not supported yet");
                Ok(Selection::NotSupported(from_to))
            }
            FromTo::Unknown | FromTo::BlobBlob | FromTo::FileBlob | FromTo::BlobTrash => {
                error!(%from_to, "no strategy for transfer kind");
                Err(XferError::UnrecognizedFromTo(from_to.to_string()))
            }
        }
    }

    /// Like [`select`](Self::select), starting from the raw header byte.
    pub fn select_raw(&self, raw: u8) -> Result<Selection, XferError> {
        match FromTo::try_from(raw) {
            Ok(from_to) => self.select(from_to),
            Err(e) => {
                error!(raw, "undefined transfer kind");
                Err(XferError::UnrecognizedFromTo(e.to_string()))
            }
        }
    }

    /// Runs the transfer behind `ctx` with the matching strategy. Returns
    /// `false` when its kind is not supported; the transfer is left untouched.
    pub fn dispatch(&self, ctx: &TransferContext<'_>) -> Result<bool, XferError> {
        match self.select(ctx.from_to())? {
            Selection::Strategy(strategy) => {
                tracing::debug!(
                    index = ctx.index(),
                    strategy = strategy.name(),
                    "dispatching transfer"
                );
                strategy.execute(ctx)?;
                Ok(true)
            }
            Selection::NotSupported(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuttle_common::{JobId, TransferStatus};
    use shuttle_plan::{JobPartOrder, PlanFile, PlanHeader, TransferOrder};
    use shuttle_status::{JobStatusManager, JobSummary};

    use crate::EngineConfig;

    struct Mock(&'static str);

    impl TransferStrategy for Mock {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, ctx: &TransferContext<'_>) -> Result<(), XferError> {
            ctx.start();
            ctx.report(TransferStatus::Success, 0)?;
            Ok(())
        }
    }

    fn table() -> StrategyTable {
        StrategyTable::new(Arc::new(Mock("download")), Arc::new(Mock("upload")))
    }

    fn strategy_name(sel: Selection) -> String {
        match sel {
            Selection::Strategy(s) => s.name().to_owned(),
            other => panic!("expected strategy, got {other:?}"),
        }
    }

    #[test]
    fn defined_pairs() {
        let t = table();
        assert_eq!(strategy_name(t.select(FromTo::BlobLocal).unwrap()), "download");
        assert_eq!(strategy_name(t.select(FromTo::LocalBlob).unwrap()), "upload");
        assert!(matches!(
            t.select(FromTo::FileLocal).unwrap(),
            Selection::NotSupported(FromTo::FileLocal)
        ));
        assert!(matches!(
            t.select(FromTo::LocalFile).unwrap(),
            Selection::NotSupported(FromTo::LocalFile)
        ));
    }

    #[test]
    fn unrecognized_pairs_fail() {
        let t = table();
        for ft in [FromTo::Unknown, FromTo::BlobBlob, FromTo::FileBlob, FromTo::BlobTrash] {
            assert!(matches!(t.select(ft), Err(XferError::UnrecognizedFromTo(_))));
        }
        assert!(matches!(t.select_raw(200), Err(XferError::UnrecognizedFromTo(_))));
    }

    #[test]
    fn raw_lookup() {
        let t = table();
        let raw = FromTo::LocalBlob.as_raw();
        assert_eq!(strategy_name(t.select_raw(raw).unwrap()), "upload");
    }

    #[test]
    fn dispatch_runs_strategy() {
        let order = JobPartOrder {
            header: PlanHeader {
                from_to: FromTo::LocalBlob,
                ..Default::default()
            },
            transfers: vec![TransferOrder {
                source: "/a/b.txt".into(),
                destination: "container/b.txt".into(),
                modified_time: 0,
                source_size: 10,
            }],
        };
        let plan = PlanFile::create_in_memory(&order).unwrap();
        let mgr = JobStatusManager::with_summary(JobSummary::new(JobId::new()));
        let cfg = EngineConfig::default();
        let ctx = TransferContext::new(&plan, 0, &mgr, &cfg).unwrap();

        assert!(table().dispatch(&ctx).unwrap());
        assert_eq!(plan.transfer(0).unwrap().transfer_status().unwrap(), TransferStatus::Success);
        assert_eq!(mgr.snapshot().unwrap().transfers_completed, 1);
    }

    #[test]
    fn dispatch_skips_unsupported() {
        let order = JobPartOrder {
            header: PlanHeader {
                from_to: FromTo::FileLocal,
                ..Default::default()
            },
            transfers: vec![TransferOrder {
                source: "share/x".into(),
                destination: "/x".into(),
                modified_time: 0,
                source_size: 1,
            }],
        };
        let plan = PlanFile::create_in_memory(&order).unwrap();
        let mgr = JobStatusManager::with_summary(JobSummary::new(JobId::new()));
        let cfg = EngineConfig::default();
        let ctx = TransferContext::new(&plan, 0, &mgr, &cfg).unwrap();

        assert!(!table().dispatch(&ctx).unwrap());
        assert_eq!(
            plan.transfer(0).unwrap().transfer_status().unwrap(),
            TransferStatus::NotStarted
        );
    }
}
