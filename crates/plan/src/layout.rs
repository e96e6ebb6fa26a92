//! Binary layout of a job part plan.
//!
//! ```text
//! [ header: HEADER_SIZE bytes                          ]
//! [ transfer 0: TRANSFER_SIZE bytes                     ]
//! [ ...                                                 ]
//! [ transfer n-1                                        ]
//! [ string blob: src0 dst0 src1 dst1 ... (no separators) ]
//! ```
//!
//! All integers are little-endian. String offsets stored in a transfer
//! record are relative to the start of the region, and a transfer's
//! destination string always begins right after its source string.
//!
//! Bump [`DATA_SCHEMA_VERSION`] on every incompatible change to this file.

use serde::Serialize;

use shuttle_common::{FromTo, JobId, JobPriority, LogLevel, PartNumber};

use crate::PlanError;

/// Schema version written to, and required from, every plan header.
pub const DATA_SCHEMA_VERSION: u32 = 0;

pub const CONTENT_TYPE_MAX_BYTES: usize = 256;
pub const CONTENT_ENCODING_MAX_BYTES: usize = 256;
pub const BLOB_TIER_MAX_BYTES: usize = 10;
pub const METADATA_MAX_BYTES: usize = 1000;

// ---------------------------------------------------------------------------
// Header offsets
// ---------------------------------------------------------------------------

pub(crate) const VERSION: usize = 0;
pub(crate) const JOB_ID: usize = VERSION + 4;
pub(crate) const PART_NUMBER: usize = JOB_ID + 16;
pub(crate) const IS_FINAL_PART: usize = PART_NUMBER + 4;
pub(crate) const PRIORITY: usize = IS_FINAL_PART + 1;
pub(crate) const TTL_AFTER_COMPLETION: usize = PRIORITY + 3;
pub(crate) const FROM_TO: usize = TTL_AFTER_COMPLETION + 4;
pub(crate) const NUM_TRANSFERS: usize = FROM_TO + 4;
pub(crate) const LOG_LEVEL: usize = NUM_TRANSFERS + 4;

// Blob destination block.
pub(crate) const NO_GUESS_MIME_TYPE: usize = LOG_LEVEL + 4;
pub(crate) const CONTENT_TYPE_LEN: usize = NO_GUESS_MIME_TYPE + 2;
pub(crate) const CONTENT_TYPE: usize = CONTENT_TYPE_LEN + 2;
pub(crate) const CONTENT_ENCODING_LEN: usize = CONTENT_TYPE + CONTENT_TYPE_MAX_BYTES;
pub(crate) const CONTENT_ENCODING: usize = CONTENT_ENCODING_LEN + 2;
pub(crate) const BLOCK_BLOB_TIER_LEN: usize = CONTENT_ENCODING + CONTENT_ENCODING_MAX_BYTES;
pub(crate) const BLOCK_BLOB_TIER: usize = BLOCK_BLOB_TIER_LEN + 1;
pub(crate) const PAGE_BLOB_TIER_LEN: usize = BLOCK_BLOB_TIER + BLOB_TIER_MAX_BYTES;
pub(crate) const PAGE_BLOB_TIER: usize = PAGE_BLOB_TIER_LEN + 1;
pub(crate) const METADATA_LEN: usize = PAGE_BLOB_TIER + BLOB_TIER_MAX_BYTES;
pub(crate) const METADATA: usize = METADATA_LEN + 2;
pub(crate) const BLOCK_SIZE: usize = METADATA + METADATA_MAX_BYTES + 2;

// Local destination block.
pub(crate) const PRESERVE_LAST_MODIFIED_TIME: usize = BLOCK_SIZE + 4;

/// Offset of the atomic job status word. Everything before it is immutable.
pub const JOB_STATUS: usize = PRESERVE_LAST_MODIFIED_TIME + 4;

/// Size of the header; transfer records start here.
pub const HEADER_SIZE: usize = (JOB_STATUS + 4).next_multiple_of(8);

// ---------------------------------------------------------------------------
// Transfer record offsets
// ---------------------------------------------------------------------------

pub(crate) const SRC_OFFSET: usize = 0;
pub(crate) const SRC_LENGTH: usize = SRC_OFFSET + 8;
pub(crate) const DST_LENGTH: usize = SRC_LENGTH + 2;
pub(crate) const MODIFIED_TIME: usize = DST_LENGTH + 6;
pub(crate) const SOURCE_SIZE: usize = MODIFIED_TIME + 8;

/// Offset of the atomic completion time within a record. Everything before
/// it is immutable.
pub const COMPLETION_TIME: usize = SOURCE_SIZE + 8;

/// Offset of the atomic transfer status word within a record.
pub const TRANSFER_STATUS: usize = COMPLETION_TIME + 8;

/// Stride between consecutive transfer records.
pub const TRANSFER_SIZE: usize = (TRANSFER_STATUS + 4).next_multiple_of(8);

const _: () = {
    assert!(JOB_STATUS % 4 == 0);
    assert!(HEADER_SIZE % 8 == 0);
    assert!(COMPLETION_TIME % 8 == 0);
    assert!(TRANSFER_STATUS % 4 == 0);
    assert!(TRANSFER_SIZE % 8 == 0);
    assert!(BLOCK_SIZE % 4 == 0);
};

/// Byte offset of transfer record `index`.
pub const fn transfer_offset(index: u32) -> usize {
    HEADER_SIZE + index as usize * TRANSFER_SIZE
}

/// Byte offset where the string blob of a part with `num_transfers` begins.
pub const fn blob_offset(num_transfers: u32) -> usize {
    transfer_offset(num_transfers)
}

/// Total region size for a part.
pub const fn region_len(num_transfers: u32, blob_len: usize) -> usize {
    blob_offset(num_transfers) + blob_len
}

/// File name of a persisted plan, e.g. `<job-id>--00003.steV0`.
pub fn plan_file_name(job_id: JobId, part: PartNumber) -> String {
    format!("{job_id}--{part}.steV{DATA_SCHEMA_VERSION}")
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn get<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

pub(crate) fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(get(buf, offset))
}

pub(crate) fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(get(buf, offset))
}

pub(crate) fn get_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(get(buf, offset))
}

pub(crate) fn get_i64(buf: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(get(buf, offset))
}

pub(crate) fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// A length-prefixed, fixed-capacity string field in the header.
struct FixedField {
    name: &'static str,
    len_offset: usize,
    len_width: usize,
    offset: usize,
    capacity: usize,
}

const CONTENT_TYPE_FIELD: FixedField = FixedField {
    name: "content type",
    len_offset: CONTENT_TYPE_LEN,
    len_width: 2,
    offset: CONTENT_TYPE,
    capacity: CONTENT_TYPE_MAX_BYTES,
};

const CONTENT_ENCODING_FIELD: FixedField = FixedField {
    name: "content encoding",
    len_offset: CONTENT_ENCODING_LEN,
    len_width: 2,
    offset: CONTENT_ENCODING,
    capacity: CONTENT_ENCODING_MAX_BYTES,
};

const BLOCK_BLOB_TIER_FIELD: FixedField = FixedField {
    name: "block blob tier",
    len_offset: BLOCK_BLOB_TIER_LEN,
    len_width: 1,
    offset: BLOCK_BLOB_TIER,
    capacity: BLOB_TIER_MAX_BYTES,
};

const PAGE_BLOB_TIER_FIELD: FixedField = FixedField {
    name: "page blob tier",
    len_offset: PAGE_BLOB_TIER_LEN,
    len_width: 1,
    offset: PAGE_BLOB_TIER,
    capacity: BLOB_TIER_MAX_BYTES,
};

const METADATA_FIELD: FixedField = FixedField {
    name: "metadata",
    len_offset: METADATA_LEN,
    len_width: 2,
    offset: METADATA,
    capacity: METADATA_MAX_BYTES,
};

impl FixedField {
    fn check(&self, value: &str) -> Result<(), PlanError> {
        if value.len() > self.capacity {
            return Err(PlanError::FieldTooLong {
                field: self.name,
                len: value.len(),
                max: self.capacity,
            });
        }
        Ok(())
    }

    fn encode(&self, buf: &mut [u8], value: &str) -> Result<(), PlanError> {
        self.check(value)?;
        let len = value.len();
        match self.len_width {
            1 => buf[self.len_offset] = len as u8,
            _ => put(buf, self.len_offset, &(len as u16).to_le_bytes()),
        }
        let data = &mut buf[self.offset..self.offset + self.capacity];
        data[..len].copy_from_slice(value.as_bytes());
        data[len..].fill(0);
        Ok(())
    }

    fn decode(&self, buf: &[u8]) -> Result<String, PlanError> {
        let len = match self.len_width {
            1 => buf[self.len_offset] as usize,
            _ => get_u16(buf, self.len_offset) as usize,
        };
        if len > self.capacity {
            return Err(PlanError::FieldTooLong {
                field: self.name,
                len,
                max: self.capacity,
            });
        }
        let bytes = &buf[self.offset..self.offset + len];
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|source| PlanError::InvalidUtf8 {
                what: self.name.to_owned(),
                source,
            })
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Settings used when the destination is a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DstBlobData {
    /// Keep the content type as given instead of guessing it from the source.
    pub no_guess_mime_type: bool,
    pub content_type: String,
    pub content_encoding: String,
    pub block_blob_tier: String,
    pub page_blob_tier: String,
    pub metadata: String,
    /// Maximum block size; determines chunk count of each transfer.
    pub block_size: u32,
}

impl DstBlobData {
    /// Fails if any field exceeds its fixed capacity.
    pub fn validate(&self) -> Result<(), PlanError> {
        CONTENT_TYPE_FIELD.check(&self.content_type)?;
        CONTENT_ENCODING_FIELD.check(&self.content_encoding)?;
        BLOCK_BLOB_TIER_FIELD.check(&self.block_blob_tier)?;
        PAGE_BLOB_TIER_FIELD.check(&self.page_blob_tier)?;
        METADATA_FIELD.check(&self.metadata)
    }
}

/// Settings used when the destination is the local filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DstLocalData {
    pub preserve_last_modified_time: bool,
}

/// Immutable header fields of a job part plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanHeader {
    pub job_id: JobId,
    pub part_number: PartNumber,
    pub is_final_part: bool,
    pub priority: JobPriority,
    /// Seconds to keep the plan file after the part completes.
    pub ttl_after_completion: u32,
    pub from_to: FromTo,
    pub num_transfers: u32,
    pub log_level: LogLevel,
    pub dst_blob: DstBlobData,
    pub dst_local: DstLocalData,
}

impl PlanHeader {
    /// Writes every immutable header field into `buf[..JOB_STATUS]`.
    ///
    /// Padding bytes are zeroed. The job status word is left untouched.
    pub fn encode(&self, buf: &mut [u8]) -> Result<(), PlanError> {
        if buf.len() < HEADER_SIZE {
            return Err(PlanError::Truncated {
                len: buf.len(),
                needed: HEADER_SIZE,
            });
        }
        self.dst_blob.validate()?;

        buf[..JOB_STATUS].fill(0);
        put(buf, VERSION, &DATA_SCHEMA_VERSION.to_le_bytes());
        put(buf, JOB_ID, self.job_id.as_bytes());
        put(buf, PART_NUMBER, &self.part_number.0.to_le_bytes());
        buf[IS_FINAL_PART] = self.is_final_part as u8;
        buf[PRIORITY] = self.priority.as_raw();
        put(buf, TTL_AFTER_COMPLETION, &self.ttl_after_completion.to_le_bytes());
        buf[FROM_TO] = self.from_to.as_raw();
        put(buf, NUM_TRANSFERS, &self.num_transfers.to_le_bytes());
        buf[LOG_LEVEL] = self.log_level.as_raw();

        let blob = &self.dst_blob;
        buf[NO_GUESS_MIME_TYPE] = blob.no_guess_mime_type as u8;
        CONTENT_TYPE_FIELD.encode(buf, &blob.content_type)?;
        CONTENT_ENCODING_FIELD.encode(buf, &blob.content_encoding)?;
        BLOCK_BLOB_TIER_FIELD.encode(buf, &blob.block_blob_tier)?;
        PAGE_BLOB_TIER_FIELD.encode(buf, &blob.page_blob_tier)?;
        METADATA_FIELD.encode(buf, &blob.metadata)?;
        put(buf, BLOCK_SIZE, &blob.block_size.to_le_bytes());

        buf[PRESERVE_LAST_MODIFIED_TIME] = self.dst_local.preserve_last_modified_time as u8;
        Ok(())
    }

    /// Reads the immutable header fields from `buf`, which must hold at
    /// least the bytes up to the job status word.
    ///
    /// Rejects any schema version other than [`DATA_SCHEMA_VERSION`].
    pub fn decode(buf: &[u8]) -> Result<Self, PlanError> {
        if buf.len() < JOB_STATUS {
            return Err(PlanError::Truncated {
                len: buf.len(),
                needed: JOB_STATUS,
            });
        }
        let version = get_u32(buf, VERSION);
        if version != DATA_SCHEMA_VERSION {
            return Err(PlanError::UnsupportedVersion {
                found: version,
                expected: DATA_SCHEMA_VERSION,
            });
        }

        Ok(Self {
            job_id: JobId::from_bytes(get(buf, JOB_ID)),
            part_number: PartNumber(get_u32(buf, PART_NUMBER)),
            is_final_part: buf[IS_FINAL_PART] != 0,
            priority: JobPriority::try_from(buf[PRIORITY])?,
            ttl_after_completion: get_u32(buf, TTL_AFTER_COMPLETION),
            from_to: FromTo::try_from(buf[FROM_TO])?,
            num_transfers: get_u32(buf, NUM_TRANSFERS),
            log_level: LogLevel::try_from(buf[LOG_LEVEL])?,
            dst_blob: DstBlobData {
                no_guess_mime_type: buf[NO_GUESS_MIME_TYPE] != 0,
                content_type: CONTENT_TYPE_FIELD.decode(buf)?,
                content_encoding: CONTENT_ENCODING_FIELD.decode(buf)?,
                block_blob_tier: BLOCK_BLOB_TIER_FIELD.decode(buf)?,
                page_blob_tier: PAGE_BLOB_TIER_FIELD.decode(buf)?,
                metadata: METADATA_FIELD.decode(buf)?,
                block_size: get_u32(buf, BLOCK_SIZE),
            },
            dst_local: DstLocalData {
                preserve_last_modified_time: buf[PRESERVE_LAST_MODIFIED_TIME] != 0,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Transfer record
// ---------------------------------------------------------------------------

/// Immutable fields of one transfer record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferEntry {
    /// Offset of the source string from the start of the region.
    pub src_offset: u64,
    pub src_length: u16,
    /// The destination string starts at `src_offset + src_length`.
    pub dst_length: u16,
    /// Source modification time in nanoseconds since the Unix epoch.
    pub modified_time: i64,
    pub source_size: u64,
}

impl TransferEntry {
    /// Writes the immutable fields into `record[..COMPLETION_TIME]`.
    pub fn encode(&self, record: &mut [u8]) {
        record[..COMPLETION_TIME].fill(0);
        put(record, SRC_OFFSET, &self.src_offset.to_le_bytes());
        put(record, SRC_LENGTH, &self.src_length.to_le_bytes());
        put(record, DST_LENGTH, &self.dst_length.to_le_bytes());
        put(record, MODIFIED_TIME, &self.modified_time.to_le_bytes());
        put(record, SOURCE_SIZE, &self.source_size.to_le_bytes());
    }

    /// Reads the immutable fields from `record[..COMPLETION_TIME]`.
    pub fn decode(record: &[u8]) -> Self {
        Self {
            src_offset: get_u64(record, SRC_OFFSET),
            src_length: get_u16(record, SRC_LENGTH),
            dst_length: get_u16(record, DST_LENGTH),
            modified_time: get_i64(record, MODIFIED_TIME),
            source_size: get_u64(record, SOURCE_SIZE),
        }
    }

    /// Offset one past the last byte of the destination string.
    pub fn strings_end(&self) -> u64 {
        self.src_offset + u64::from(self.src_length) + u64::from(self.dst_length)
    }
}
