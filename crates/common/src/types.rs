use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{TransferStatus, UnknownValue};

/// Source and destination kinds of every transfer in a job part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FromTo {
    #[default]
    Unknown,
    LocalBlob,
    LocalFile,
    BlobLocal,
    FileLocal,
    BlobBlob,
    FileBlob,
    BlobTrash,
}

/// Direction of data relative to the local machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl FromTo {
    pub const fn as_raw(self) -> u8 {
        match self {
            FromTo::Unknown => 0,
            FromTo::LocalBlob => 1,
            FromTo::LocalFile => 2,
            FromTo::BlobLocal => 3,
            FromTo::FileLocal => 4,
            FromTo::BlobBlob => 5,
            FromTo::FileBlob => 6,
            FromTo::BlobTrash => 7,
        }
    }

    /// Upload for local sources, download for local destinations, `None`
    /// for service-to-service pairs.
    pub fn direction(self) -> Option<Direction> {
        match self {
            FromTo::LocalBlob | FromTo::LocalFile => Some(Direction::Upload),
            FromTo::BlobLocal | FromTo::FileLocal => Some(Direction::Download),
            _ => None,
        }
    }
}

impl fmt::Display for FromTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl TryFrom<u8> for FromTo {
    type Error = UnknownValue;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => FromTo::Unknown,
            1 => FromTo::LocalBlob,
            2 => FromTo::LocalFile,
            3 => FromTo::BlobLocal,
            4 => FromTo::FileLocal,
            5 => FromTo::BlobBlob,
            6 => FromTo::FileBlob,
            7 => FromTo::BlobTrash,
            _ => {
                return Err(UnknownValue {
                    kind: "from-to",
                    raw: raw.into(),
                });
            }
        })
    }
}

/// Scheduling priority of a job part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    pub const fn as_raw(self) -> u8 {
        match self {
            JobPriority::Normal => 0,
            JobPriority::Low => 1,
        }
    }
}

impl TryFrom<u8> for JobPriority {
    type Error = UnknownValue;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(JobPriority::Normal),
            1 => Ok(JobPriority::Low),
            _ => Err(UnknownValue {
                kind: "priority",
                raw: raw.into(),
            }),
        }
    }
}

/// Minimum severity a job part logs at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    None,
    Fatal,
    Panic,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub const fn as_raw(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = UnknownValue;

    fn try_from(raw: u8) -> Result<Self, UnknownValue> {
        Ok(match raw {
            0 => LogLevel::None,
            1 => LogLevel::Fatal,
            2 => LogLevel::Panic,
            3 => LogLevel::Error,
            4 => LogLevel::Warning,
            5 => LogLevel::Info,
            6 => LogLevel::Debug,
            _ => {
                return Err(UnknownValue {
                    kind: "log level",
                    raw: raw.into(),
                });
            }
        })
    }
}

/// Outcome of one transfer as reported to the job status manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetail {
    pub src: String,
    pub dst: String,
    pub transfer_status: TransferStatus,
    pub transfer_size: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub error_code: i32,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}
