//! Error types for plan files.

use shuttle_common::UnknownValue;

/// Errors produced while creating, opening or reading a job part plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer index {index} out of range (part has {count} transfers)")]
    TransferIndexOutOfRange { index: u32, count: u32 },

    #[error("byte range {offset}+{len} outside of {region} byte region")]
    OutOfBounds { offset: u64, len: u64, region: usize },

    #[error("{field} is {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("path string of transfer {index} is {len} bytes (max {})", u16::MAX)]
    StringTooLong { index: usize, len: usize },

    #[error("too many transfers in one part: {0}")]
    TooManyTransfers(usize),

    #[error("invalid UTF-8 in {what}: {source}")]
    InvalidUtf8 {
        what: String,
        source: std::str::Utf8Error,
    },

    #[error("unsupported plan schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("plan region is {len} bytes, need at least {needed}")]
    Truncated { len: usize, needed: usize },

    #[error("invalid field: {0}")]
    InvalidField(#[from] UnknownValue),

    #[error("plan has been unmapped")]
    Unmapped,
}
