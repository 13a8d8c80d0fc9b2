//! Observable events of the segmented log
//!
//! Every lifecycle transition worth logging has a typed event with a
//! stable name. Call sites attach the name as the `event` field of a
//! `tracing` event so log pipelines can filter on it.

use std::fmt;

/// Observable events in segwal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Log lifecycle
    /// Log opened (existing segments loaded or fresh segment created)
    LogOpen,
    /// All segments closed
    LogClose,
    /// Log directory deleted
    LogRemove,
    /// Log wiped and reopened at its initial offset
    LogReset,

    // Segments
    /// Segment files created
    SegmentCreate,
    /// Active segment maxed, new active segment created
    SegmentRollover,
    /// Segment files deleted by truncation
    SegmentRemove,

    // Retention
    /// Truncation pass complete
    LogTruncate,

    // Reopen validation
    /// Index entries past the last valid frame discarded
    IndexRepair,
    /// Store bytes past the last indexed frame cut off
    StoreRepair,
    /// Unrecoverable on-disk inconsistency (FATAL)
    Corruption,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::LogOpen => "LOG_OPEN",
            Event::LogClose => "LOG_CLOSE",
            Event::LogRemove => "LOG_REMOVE",
            Event::LogReset => "LOG_RESET",

            Event::SegmentCreate => "SEGMENT_CREATE",
            Event::SegmentRollover => "SEGMENT_ROLLOVER",
            Event::SegmentRemove => "SEGMENT_REMOVE",

            Event::LogTruncate => "LOG_TRUNCATE",

            Event::IndexRepair => "INDEX_REPAIR",
            Event::StoreRepair => "STORE_REPAIR",
            Event::Corruption => "LOG_CORRUPTION",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::Corruption)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
