//! Segment size limits and log configuration
//!
//! The configuration is consumed, not owned, by the log: callers typically
//! embed [`LogConfig`] in their own configuration file and hand it over at
//! open time. Missing fields fall back to defaults; zero limits are treated
//! as unset.

use serde::{Deserialize, Serialize};

use super::errors::{LogError, LogResult};
use super::index::ENTRY_WIDTH;

/// Default maximum store bytes per segment (1 MiB)
pub const DEFAULT_MAX_STORE_BYTES: u64 = 1024 * 1024;

/// Default maximum index bytes per segment (1 MiB)
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 1024 * 1024;

fn default_max_store_bytes() -> u64 {
    DEFAULT_MAX_STORE_BYTES
}

fn default_max_index_bytes() -> u64 {
    DEFAULT_MAX_INDEX_BYTES
}

/// Per-segment limits shared read-only by every segment of a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Store size at which the segment is rolled over
    #[serde(default = "default_max_store_bytes")]
    pub max_store_bytes: u64,

    /// Capacity of the memory-mapped index region
    #[serde(default = "default_max_index_bytes")]
    pub max_index_bytes: u64,

    /// Base offset of the first segment of a fresh log
    #[serde(default)]
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_MAX_STORE_BYTES,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
            initial_offset: 0,
        }
    }
}

/// Log configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub segment: SegmentConfig,
}

impl LogConfig {
    /// Creates a config with explicit store and index limits.
    pub fn new(max_store_bytes: u64, max_index_bytes: u64) -> Self {
        Self {
            segment: SegmentConfig {
                max_store_bytes,
                max_index_bytes,
                initial_offset: 0,
            },
        }
    }

    /// Sets the base offset used for the first segment of a fresh log.
    pub fn with_initial_offset(mut self, initial_offset: u64) -> Self {
        self.segment.initial_offset = initial_offset;
        self
    }

    /// Parses a config from JSON, applying defaults for missing fields.
    pub fn from_json_str(json: &str) -> LogResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| LogError::InvalidConfig(format!("failed to parse config: {}", e)))
    }

    /// Replaces unset (zero) limits with the defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.segment.max_store_bytes == 0 {
            self.segment.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if self.segment.max_index_bytes == 0 {
            self.segment.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }
        self
    }

    /// Checks that a segment built from this config can hold a record.
    pub fn validate(&self) -> LogResult<()> {
        if self.segment.max_index_bytes < ENTRY_WIDTH {
            return Err(LogError::InvalidConfig(format!(
                "max_index_bytes {} cannot hold a single {}-byte index entry",
                self.segment.max_index_bytes, ENTRY_WIDTH
            )));
        }
        if self.segment.max_store_bytes == 0 {
            return Err(LogError::InvalidConfig(
                "max_store_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
