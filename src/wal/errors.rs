//! Error types for the segmented log
//!
//! Error codes:
//! - SEGWAL_OFFSET_OUT_OF_RANGE (ERROR severity)
//! - SEGWAL_INDEX_FULL (ERROR severity, internal)
//! - SEGWAL_CORRUPTION (FATAL severity)
//! - SEGWAL_IO_FAILED (ERROR severity)
//! - SEGWAL_FSYNC_FAILED (FATAL severity)
//! - SEGWAL_CLOSED (ERROR severity)
//! - SEGWAL_INVALID_CONFIG (ERROR severity)

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Severity of a log error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the log stays usable
    Error,
    /// The on-disk state can no longer be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Errors raised by the store, index, segment and log layers.
#[derive(Debug, Error)]
pub enum LogError {
    /// No segment contains the requested offset.
    #[error("offset out of range: {offset}")]
    OffsetOutOfRange { offset: u64 },

    /// The index mapping cannot hold another entry.
    ///
    /// Segments roll over before this can happen, so seeing it past the
    /// log boundary means the rollover policy is broken.
    #[error("index full: {path} holds {capacity} bytes")]
    IndexFull { path: PathBuf, capacity: u64 },

    /// On-disk bytes do not form valid frames or index entries.
    #[error("corruption in {path} at byte {position}: {reason}")]
    Corruption {
        path: PathBuf,
        position: u64,
        reason: String,
    },

    /// A file operation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// fsync of a store, index or directory failed.
    #[error("fsync failed for {path}: {source}")]
    Fsync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The store, index or log was already closed.
    #[error("{0} is closed")]
    Closed(String),

    /// Configuration cannot describe a usable segment.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl LogError {
    /// Wraps an I/O error with a context message.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        LogError::Io {
            context: context.into(),
            source,
        }
    }

    /// Builds an fsync failure for `path`.
    pub fn fsync(path: &Path, source: io::Error) -> Self {
        LogError::Fsync {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Builds a corruption error at a byte position of `path`.
    pub fn corruption(path: &Path, position: u64, reason: impl Into<String>) -> Self {
        LogError::Corruption {
            path: path.to_path_buf(),
            position,
            reason: reason.into(),
        }
    }

    /// Returns the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            LogError::OffsetOutOfRange { .. } => "SEGWAL_OFFSET_OUT_OF_RANGE",
            LogError::IndexFull { .. } => "SEGWAL_INDEX_FULL",
            LogError::Corruption { .. } => "SEGWAL_CORRUPTION",
            LogError::Io { .. } => "SEGWAL_IO_FAILED",
            LogError::Fsync { .. } => "SEGWAL_FSYNC_FAILED",
            LogError::Closed(_) => "SEGWAL_CLOSED",
            LogError::InvalidConfig(_) => "SEGWAL_INVALID_CONFIG",
        }
    }

    /// Returns the severity level for this error.
    pub fn severity(&self) -> Severity {
        match self {
            LogError::Corruption { .. } | LogError::Fsync { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns whether the caller should stop using the log.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns the requested offset if this is an out-of-range error.
    pub fn out_of_range_offset(&self) -> Option<u64> {
        match self {
            LogError::OffsetOutOfRange { offset } => Some(*offset),
            _ => None,
        }
    }
}

/// Result type for log operations
pub type LogResult<T> = Result<T, LogError>;
