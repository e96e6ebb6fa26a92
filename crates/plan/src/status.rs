//! Atomic status words embedded in a plan.
//!
//! Both cells borrow a word inside the mapped region. Values are stored
//! little-endian like every other plan field.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

use shuttle_common::{JobStatus, TransferStatus};

use crate::PlanError;

/// Transition rule for a transfer status word.
///
/// `Failed` is sticky: once a transfer has failed, no later report (which may
/// be a stale success from another chunk) replaces it.
pub fn merge_transfer_status(current: TransferStatus, new: TransferStatus) -> TransferStatus {
    if current == TransferStatus::Failed {
        current
    } else {
        new
    }
}

/// The job status word of a plan header.
#[derive(Debug, Clone, Copy)]
pub struct JobStatusCell<'a>(&'a AtomicU32);

impl<'a> JobStatusCell<'a> {
    pub(crate) fn new(word: &'a AtomicU32) -> Self {
        Self(word)
    }

    pub fn load(&self) -> Result<JobStatus, PlanError> {
        let raw = u32::from_le(self.0.load(Ordering::Acquire));
        Ok(JobStatus::try_from(raw)?)
    }

    pub fn store(&self, status: JobStatus) {
        self.0.store(status.as_raw().to_le(), Ordering::Release);
    }
}

/// The status word of a transfer record.
#[derive(Debug, Clone, Copy)]
pub struct TransferStatusCell<'a>(&'a AtomicI32);

impl<'a> TransferStatusCell<'a> {
    pub(crate) fn new(word: &'a AtomicI32) -> Self {
        Self(word)
    }

    pub fn load(&self) -> Result<TransferStatus, PlanError> {
        let raw = i32::from_le(self.0.load(Ordering::Acquire));
        Ok(TransferStatus::try_from(raw)?)
    }

    /// Applies [`merge_transfer_status`] in a compare-and-swap loop and
    /// returns the status in effect afterwards.
    ///
    /// A word holding an unrecognised value is overwritten.
    pub fn store(&self, new: TransferStatus) -> TransferStatus {
        self.transition(new).current
    }

    /// Like [`store`](Self::store), also reporting the status the word held
    /// when the update landed.
    pub fn transition(&self, new: TransferStatus) -> StatusTransition {
        let mut previous = None;
        let result = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                previous = TransferStatus::try_from(i32::from_le(raw)).ok();
                let next = previous.map_or(new, |current| merge_transfer_status(current, new));
                let next = next.as_raw().to_le();
                (next != raw).then_some(next)
            });
        let current = match result {
            Ok(_) => new,
            // Nothing written: the word already holds the merged value.
            Err(raw) => TransferStatus::try_from(i32::from_le(raw)).unwrap_or(new),
        };
        StatusTransition { previous, current }
    }
}

/// Outcome of one transfer status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    /// Status before the update, `None` if the word held garbage.
    pub previous: Option<TransferStatus>,
    pub current: TransferStatus,
}

impl StatusTransition {
    /// Returns `true` if this update moved the transfer from a running
    /// state into a terminal one. Exactly one update per transfer does so.
    pub fn entered_terminal(&self) -> bool {
        self.current.is_terminal() && !self.previous.is_some_and(TransferStatus::is_terminal)
    }
}

/// The completion time word of a transfer record, written once.
#[derive(Debug, Clone, Copy)]
pub struct CompletionTimeCell<'a>(&'a AtomicU64);

impl<'a> CompletionTimeCell<'a> {
    pub(crate) fn new(word: &'a AtomicU64) -> Self {
        Self(word)
    }

    /// Nanoseconds since the Unix epoch, or 0 if not yet completed.
    pub fn load(&self) -> u64 {
        u64::from_le(self.0.load(Ordering::Acquire))
    }

    /// Records the completion time unless one was already recorded.
    /// Returns `true` if this call wrote it.
    pub fn set_once(&self, nanos: u64) -> bool {
        self.0
            .compare_exchange(0, nanos.to_le(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
