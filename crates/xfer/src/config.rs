//! Retry and pacing tunables honoured by the transfer pipeline.
//!
//! Defaults are compiled in; an optional JSON file overrides any subset:
//!
//! ```json
//! { "upload": { "maxTries": 8, "retryDelayMs": 2000 }, "pacerWaitMs": 20 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use shuttle_common::{Direction, FromTo};

use crate::XferError;

/// Minimum wait between two grants of the rate limiter.
pub const PACER_TIME_TO_WAIT: Duration = Duration::from_millis(50);

/// Retry behaviour for one transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first.
    pub max_tries: u32,
    pub try_timeout: Duration,
    /// Delay before the first retry; doubles on every further retry.
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

pub const UPLOAD_RETRY_POLICY: RetryPolicy = RetryPolicy {
    max_tries: 5,
    try_timeout: Duration::from_secs(10 * 60),
    retry_delay: Duration::from_secs(3),
    max_retry_delay: Duration::from_secs(12),
};

pub const DOWNLOAD_RETRY_POLICY: RetryPolicy = RetryPolicy {
    max_tries: 5,
    try_timeout: Duration::from_secs(10 * 60),
    retry_delay: Duration::from_secs(1),
    max_retry_delay: Duration::from_secs(3),
};

impl RetryPolicy {
    /// Backoff before attempt number `attempt` (1-based). The first attempt
    /// never waits.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.retry_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }

    /// Returns `true` if another attempt may follow attempt `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_tries
    }
}

/// Tunables for the transfer pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub upload: RetryPolicy,
    pub download: RetryPolicy,
    pub pacer_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload: UPLOAD_RETRY_POLICY,
            download: DOWNLOAD_RETRY_POLICY,
            pacer_wait: PACER_TIME_TO_WAIT,
        }
    }
}

impl EngineConfig {
    /// Reads overrides from a JSON file.
    pub fn load(path: &Path) -> Result<Self, XferError> {
        let data = std::fs::read_to_string(path)?;
        let cfg = Self::from_json(&data)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(cfg)
    }

    /// Parses overrides from a JSON document; absent fields keep their
    /// defaults.
    pub fn from_json(data: &str) -> Result<Self, XferError> {
        let file: EngineConfigFile = serde_json::from_str(data)?;
        let defaults = Self::default();
        Ok(Self {
            upload: file.upload.apply(defaults.upload),
            download: file.download.apply(defaults.download),
            pacer_wait: file
                .pacer_wait_ms
                .map_or(defaults.pacer_wait, Duration::from_millis),
        })
    }

    /// Policy for transfers of the given kind. Service-to-service copies use
    /// the upload policy.
    pub fn retry_policy(&self, from_to: FromTo) -> &RetryPolicy {
        match from_to.direction() {
            Some(Direction::Download) => &self.download,
            Some(Direction::Upload) | None => &self.upload,
        }
    }
}

// ---------------------------------------------------------------------------
// On-disk form
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineConfigFile {
    #[serde(default)]
    upload: RetryPolicyFile,
    #[serde(default)]
    download: RetryPolicyFile,
    #[serde(default)]
    pacer_wait_ms: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryPolicyFile {
    #[serde(default)]
    max_tries: Option<u32>,
    #[serde(default)]
    try_timeout_ms: Option<u64>,
    #[serde(default)]
    retry_delay_ms: Option<u64>,
    #[serde(default)]
    max_retry_delay_ms: Option<u64>,
}

impl RetryPolicyFile {
    fn apply(self, base: RetryPolicy) -> RetryPolicy {
        let ms = |v: Option<u64>, d: Duration| v.map_or(d, Duration::from_millis);
        RetryPolicy {
            max_tries: self.max_tries.unwrap_or(base.max_tries),
            try_timeout: ms(self.try_timeout_ms, base.try_timeout),
            retry_delay: ms(self.retry_delay_ms, base.retry_delay),
            max_retry_delay: ms(self.max_retry_delay_ms, base.max_retry_delay),
        }
    }
}
