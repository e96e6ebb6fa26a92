use std::fs::OpenOptions;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64};

use memmap2::{MmapMut, MmapOptions, MmapRaw};

use shuttle_common::{JobStatus, TransferStatus};

use crate::PlanError;
use crate::layout::{
    self, COMPLETION_TIME, HEADER_SIZE, JOB_STATUS, PlanHeader, TRANSFER_SIZE, TRANSFER_STATUS,
    TransferEntry,
};
use crate::order::JobPartOrder;
use crate::status::{CompletionTimeCell, JobStatusCell, StatusTransition, TransferStatusCell};

/// A job part plan mapped into memory.
///
/// The mapping is held as a [`MmapRaw`] so every access derives from one
/// mutable base pointer and no slice ever spans the whole region. Immutable
/// fields are read through bounds-checked slices that never cover a status
/// word; status words are only touched atomically. Records and
/// strings borrow the plan, so [`unmap`](Self::unmap) cannot run while any of
/// them is alive, and every accessor fails with [`PlanError::Unmapped`]
/// afterwards.
#[derive(Debug)]
pub struct PlanFile {
    map: Option<MmapRaw>,
    path: Option<PathBuf>,
    num_transfers: u32,
}

impl PlanFile {
    /// Creates the plan file at `path` (truncating any existing file) and
    /// writes `order` into it.
    pub fn create(path: &Path, order: &JobPartOrder) -> Result<Self, PlanError> {
        order.validate()?;
        let len = order.region_len()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len as u64)?;

        // SAFETY: the file was just created by us and is only resized by this
        // module; the mapping stays valid for the life of `PlanFile`.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
        order.encode(&mut map)?;
        map.flush()?;

        let num_transfers = order.num_transfers()?;
        tracing::debug!(
            path = %path.display(),
            part = %order.header.part_number,
            transfers = num_transfers,
            bytes = len,
            "plan created"
        );
        Ok(Self {
            map: Some(MmapRaw::from(map)),
            path: Some(path.to_path_buf()),
            num_transfers,
        })
    }

    /// Lays out `order` in an anonymous mapping that is never persisted.
    pub fn create_in_memory(order: &JobPartOrder) -> Result<Self, PlanError> {
        order.validate()?;
        let mut map = MmapMut::map_anon(order.region_len()?)?;
        order.encode(&mut map)?;
        Ok(Self {
            map: Some(MmapRaw::from(map)),
            path: None,
            num_transfers: order.num_transfers()?,
        })
    }

    /// Maps an existing plan file, e.g. to resume a paused job.
    ///
    /// Fails if the file is shorter than its header and records, or was
    /// written with another schema version.
    pub fn open(path: &Path) -> Result<Self, PlanError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_SIZE {
            return Err(PlanError::Truncated {
                len,
                needed: HEADER_SIZE,
            });
        }

        // Plan files are owned by the job manager; nothing truncates them
        // while a job part is loaded.
        let map = MmapOptions::new().len(len).map_raw(&file)?;
        let mut plan = Self {
            map: Some(map),
            path: Some(path.to_path_buf()),
            num_transfers: 0,
        };

        let header = match plan.header() {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(path = %path.display(), "rejecting plan file: {e}");
                return Err(e);
            }
        };
        let needed = layout::blob_offset(header.num_transfers);
        if len < needed {
            return Err(PlanError::Truncated { len, needed });
        }
        plan.num_transfers = header.num_transfers;

        tracing::debug!(
            path = %path.display(),
            part = %header.part_number,
            transfers = header.num_transfers,
            "plan opened"
        );
        Ok(plan)
    }

    /// Backing file, if the plan is persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_mapped(&self) -> bool {
        self.map.is_some()
    }

    pub fn num_transfers(&self) -> u32 {
        self.num_transfers
    }

    /// Size of the mapped region in bytes.
    pub fn region_len(&self) -> Result<usize, PlanError> {
        Ok(self.region()?.len())
    }

    /// Decodes the immutable header fields.
    pub fn header(&self) -> Result<PlanHeader, PlanError> {
        PlanHeader::decode(self.immutable_bytes(0, JOB_STATUS)?)
    }

    pub fn job_status(&self) -> Result<JobStatus, PlanError> {
        self.job_status_cell()?.load()
    }

    pub fn set_job_status(&self, status: JobStatus) -> Result<(), PlanError> {
        self.job_status_cell()?.store(status);
        Ok(())
    }

    /// Returns the record of transfer `index`.
    pub fn transfer(&self, index: u32) -> Result<TransferRecord<'_>, PlanError> {
        self.region()?;
        if index >= self.num_transfers {
            return Err(PlanError::TransferIndexOutOfRange {
                index,
                count: self.num_transfers,
            });
        }

        let offset = layout::transfer_offset(index);
        let entry = TransferEntry::decode(self.immutable_bytes(offset, COMPLETION_TIME)?);
        Ok(TransferRecord {
            index,
            offset,
            entry,
            completion_time: CompletionTimeCell::new(self.atomic_u64(offset + COMPLETION_TIME)?),
            status: TransferStatusCell::new(self.atomic_i32(offset + TRANSFER_STATUS)?),
        })
    }

    /// Iterates over all transfer records in index order.
    pub fn transfers(&self) -> impl Iterator<Item = Result<TransferRecord<'_>, PlanError>> + '_ {
        (0..self.num_transfers).map(move |index| self.transfer(index))
    }

    /// Source and destination strings of transfer `index`, borrowed from the
    /// mapping.
    pub fn source_and_destination(&self, index: u32) -> Result<(&str, &str), PlanError> {
        let entry = self.transfer(index)?.entry;
        let src_start = self.blob_position(entry.src_offset)?;
        let src_len = usize::from(entry.src_length);

        let src = self.blob_bytes(src_start, src_len)?;
        let dst = self.blob_bytes(src_start + src_len, usize::from(entry.dst_length))?;
        Ok((
            utf8(src, || format!("source of transfer {index}"))?,
            utf8(dst, || format!("destination of transfer {index}"))?,
        ))
    }

    /// Writes dirty pages back to the backing file. In-memory plans have
    /// nothing to flush.
    pub fn flush(&self) -> Result<(), PlanError> {
        let map = self.region()?;
        if self.path.is_some() {
            map.flush()?;
        }
        Ok(())
    }

    /// Flushes and releases the mapping. Calling it again is a no-op.
    pub fn unmap(&mut self) -> Result<(), PlanError> {
        let Some(map) = self.map.take() else {
            return Ok(());
        };
        let flushed = match self.path {
            Some(_) => map.flush(),
            None => Ok(()),
        };
        drop(map);
        tracing::debug!(path = ?self.path, "plan unmapped");
        flushed.map_err(PlanError::from)
    }

    // -----------------------------------------------------------------------
    // Region access
    // -----------------------------------------------------------------------

    fn region(&self) -> Result<&MmapRaw, PlanError> {
        self.map.as_ref().ok_or(PlanError::Unmapped)
    }

    /// Pointer to `len` bytes at `offset`, derived from the mapping's
    /// mutable base pointer.
    fn checked_ptr(&self, offset: usize, len: usize) -> Result<*mut u8, PlanError> {
        let map = self.region()?;
        match offset.checked_add(len) {
            // SAFETY: `offset + len` is within the mapping.
            Some(end) if end <= map.len() => Ok(unsafe { map.as_mut_ptr().add(offset) }),
            _ => Err(PlanError::OutOfBounds {
                offset: offset as u64,
                len: len as u64,
                region: map.len(),
            }),
        }
    }

    /// Borrows `len` bytes at `offset`. Callers only pass ranges that hold
    /// immutable fields or string bytes.
    fn immutable_bytes(&self, offset: usize, len: usize) -> Result<&[u8], PlanError> {
        let ptr = self.checked_ptr(offset, len)?;
        // SAFETY: the range is inside the mapping and excludes every atomic
        // word. Immutable fields are only written before the mapping is
        // wrapped in `PlanFile`, so nothing writes to them while the slice is
        // alive. The slice borrows `self`, which keeps the mapping alive.
        Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
    }

    fn blob_position(&self, src_offset: u64) -> Result<usize, PlanError> {
        let blob = layout::blob_offset(self.num_transfers);
        match usize::try_from(src_offset) {
            Ok(pos) if pos >= blob => Ok(pos),
            _ => Err(PlanError::OutOfBounds {
                offset: src_offset,
                len: 0,
                region: self.region_len()?,
            }),
        }
    }

    fn blob_bytes(&self, offset: usize, len: usize) -> Result<&[u8], PlanError> {
        debug_assert!(offset >= layout::blob_offset(self.num_transfers));
        self.immutable_bytes(offset, len)
    }

    fn word_ptr<T>(&self, offset: usize) -> Result<*mut T, PlanError> {
        let ptr = self.checked_ptr(offset, size_of::<T>())?.cast::<T>();
        // Mappings are page aligned and layout offsets are multiples of the
        // word size.
        debug_assert!(ptr.is_aligned());
        Ok(ptr)
    }

    fn atomic_u32(&self, offset: usize) -> Result<&AtomicU32, PlanError> {
        let ptr = self.word_ptr::<u32>(offset)?;
        // SAFETY: the pointer carries write provenance from
        // `MmapRaw::as_mut_ptr`, is aligned and in bounds, and the word is
        // never covered by a plain slice, so every access to it is atomic.
        // The reference borrows `self`, which owns the mapping.
        Ok(unsafe { AtomicU32::from_ptr(ptr) })
    }

    fn atomic_i32(&self, offset: usize) -> Result<&AtomicI32, PlanError> {
        let ptr = self.word_ptr::<i32>(offset)?;
        // SAFETY: as for `atomic_u32`.
        Ok(unsafe { AtomicI32::from_ptr(ptr) })
    }

    fn atomic_u64(&self, offset: usize) -> Result<&AtomicU64, PlanError> {
        let ptr = self.word_ptr::<u64>(offset)?;
        // SAFETY: as for `atomic_u32`.
        Ok(unsafe { AtomicU64::from_ptr(ptr) })
    }

    fn job_status_cell(&self) -> Result<JobStatusCell<'_>, PlanError> {
        Ok(JobStatusCell::new(self.atomic_u32(JOB_STATUS)?))
    }
}

fn utf8(bytes: &[u8], what: impl FnOnce() -> String) -> Result<&str, PlanError> {
    std::str::from_utf8(bytes).map_err(|source| PlanError::InvalidUtf8 {
        what: what(),
        source,
    })
}

/// One transfer record of a mapped plan.
#[derive(Debug, Clone, Copy)]
pub struct TransferRecord<'a> {
    index: u32,
    offset: usize,
    entry: TransferEntry,
    completion_time: CompletionTimeCell<'a>,
    status: TransferStatusCell<'a>,
}

impl<'a> TransferRecord<'a> {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Bytes of the region occupied by this record.
    pub fn byte_range(&self) -> Range<usize> {
        self.offset..self.offset + TRANSFER_SIZE
    }

    pub fn entry(&self) -> &TransferEntry {
        &self.entry
    }

    pub fn src_offset(&self) -> u64 {
        self.entry.src_offset
    }

    pub fn src_length(&self) -> u16 {
        self.entry.src_length
    }

    pub fn dst_length(&self) -> u16 {
        self.entry.dst_length
    }

    /// Source modification time in nanoseconds since the Unix epoch.
    pub fn modified_time(&self) -> i64 {
        self.entry.modified_time
    }

    pub fn source_size(&self) -> u64 {
        self.entry.source_size
    }

    /// Completion time in nanoseconds since the Unix epoch, 0 while running.
    pub fn completion_time(&self) -> u64 {
        self.completion_time.load()
    }

    /// Stamps the completion time; later calls are ignored.
    pub fn set_completion_time(&self, nanos: u64) -> bool {
        self.completion_time.set_once(nanos)
    }

    pub fn transfer_status(&self) -> Result<TransferStatus, PlanError> {
        self.status.load()
    }

    /// Sets the status unless the transfer already failed. Returns the
    /// status in effect afterwards.
    pub fn set_transfer_status(&self, status: TransferStatus) -> TransferStatus {
        self.status.store(status)
    }

    /// Like [`set_transfer_status`](Self::set_transfer_status), also
    /// reporting the status the update replaced.
    pub fn update_transfer_status(&self, status: TransferStatus) -> StatusTransition {
        self.status.transition(status)
    }
}
