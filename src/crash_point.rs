//! Process aborts at named points in the write path
//!
//! Durability tests run the log in a child process with
//! `SEGWAL_CRASH_POINT` set, let it die at one of the [`points`], and then
//! reopen the directory in the parent. Several points may be armed at once
//! as a comma-separated list; the first one reached aborts.
//!
//! ```bash
//! SEGWAL_CRASH_POINT=log_before_rollover,log_during_truncate ./my-service
//! ```

use std::sync::OnceLock;

/// Environment variable listing the armed crash points
pub const CRASH_POINT_ENV: &str = "SEGWAL_CRASH_POINT";

/// Read once; the environment of a running process is not watched.
static ARMED: OnceLock<Vec<String>> = OnceLock::new();

fn parse_armed(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn armed() -> &'static [String] {
    ARMED.get_or_init(|| {
        std::env::var(CRASH_POINT_ENV)
            .map(|value| parse_armed(&value))
            .unwrap_or_default()
    })
}

/// Returns whether `point` is listed in `SEGWAL_CRASH_POINT`.
pub fn is_armed(point: &str) -> bool {
    armed().iter().any(|name| name == point)
}

/// Aborts the process when `point` is armed.
///
/// `abort` skips destructors: buffered store bytes are lost and index
/// files keep their preallocated length, as after a power cut.
#[inline]
pub fn maybe_crash(point: &str) {
    if is_armed(point) {
        eprintln!("[CRASH] Triggering crash at point: {}", point);
        std::process::abort();
    }
}

pub mod points {
    /// Inside `Segment::append`, frame written but index entry missing
    pub const SEGMENT_AFTER_STORE_APPEND: &str = "segment_after_store_append";

    /// Inside `Log::append`, after the record landed in a segment that is
    /// now maxed
    pub const LOG_BEFORE_ROLLOVER: &str = "log_before_rollover";

    /// Inside `Log::truncate`, after each segment removal
    pub const LOG_DURING_TRUNCATE: &str = "log_during_truncate";

    pub fn all() -> &'static [&'static str] {
        &[
            SEGMENT_AFTER_STORE_APPEND,
            LOG_BEFORE_ROLLOVER,
            LOG_DURING_TRUNCATE,
        ]
    }
}
