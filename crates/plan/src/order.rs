use shuttle_common::{JobStatus, TransferStatus};

use crate::PlanError;
use crate::layout::{
    self, COMPLETION_TIME, JOB_STATUS, PlanHeader, TRANSFER_SIZE, TRANSFER_STATUS, TransferEntry,
};

/// One transfer as requested by the enumerator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOrder {
    pub source: String,
    pub destination: String,
    /// Source modification time in nanoseconds since the Unix epoch.
    pub modified_time: i64,
    pub source_size: u64,
}

/// Everything needed to lay out a new job part plan.
///
/// `header.num_transfers` is ignored; the plan always records
/// `transfers.len()`.
#[derive(Debug, Clone, Default)]
pub struct JobPartOrder {
    pub header: PlanHeader,
    pub transfers: Vec<TransferOrder>,
}

impl JobPartOrder {
    /// Checks that the order fits the plan layout.
    pub fn validate(&self) -> Result<(), PlanError> {
        self.num_transfers()?;
        self.header.dst_blob.validate()?;
        for (index, t) in self.transfers.iter().enumerate() {
            for s in [&t.source, &t.destination] {
                if s.len() > u16::MAX as usize {
                    return Err(PlanError::StringTooLong {
                        index,
                        len: s.len(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn num_transfers(&self) -> Result<u32, PlanError> {
        u32::try_from(self.transfers.len())
            .map_err(|_| PlanError::TooManyTransfers(self.transfers.len()))
    }

    /// Bytes needed by the string blob.
    pub fn blob_len(&self) -> usize {
        self.transfers
            .iter()
            .map(|t| t.source.len() + t.destination.len())
            .sum()
    }

    /// Total region size for this order.
    pub fn region_len(&self) -> Result<usize, PlanError> {
        Ok(layout::region_len(self.num_transfers()?, self.blob_len()))
    }

    /// Writes the complete plan into `buf`, which must be exactly
    /// [`region_len`](Self::region_len) bytes.
    ///
    /// Strings are packed in transfer order with each destination directly
    /// after its source; readers derive the destination offset from that.
    /// Status words start as `InProgress` / `NotStarted`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), PlanError> {
        self.validate()?;
        let count = self.num_transfers()?;
        let needed = self.region_len()?;
        if buf.len() != needed {
            return Err(PlanError::Truncated {
                len: buf.len(),
                needed,
            });
        }

        let mut header = self.header.clone();
        header.num_transfers = count;
        header.encode(buf)?;
        layout::put(buf, JOB_STATUS, &JobStatus::InProgress.as_raw().to_le_bytes());

        let mut cursor = layout::blob_offset(count);
        for (index, t) in self.transfers.iter().enumerate() {
            let src = t.source.as_bytes();
            let dst = t.destination.as_bytes();
            layout::put(buf, cursor, src);
            layout::put(buf, cursor + src.len(), dst);

            let entry = TransferEntry {
                src_offset: cursor as u64,
                src_length: src.len() as u16,
                dst_length: dst.len() as u16,
                modified_time: t.modified_time,
                source_size: t.source_size,
            };
            let start = layout::transfer_offset(index as u32);
            let record = &mut buf[start..start + TRANSFER_SIZE];
            record.fill(0);
            entry.encode(record);
            layout::put(record, COMPLETION_TIME, &0u64.to_le_bytes());
            layout::put(
                record,
                TRANSFER_STATUS,
                &TransferStatus::NotStarted.as_raw().to_le_bytes(),
            );

            cursor += src.len() + dst.len();
        }
        debug_assert_eq!(cursor, buf.len());
        Ok(())
    }
}
