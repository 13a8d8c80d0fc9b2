//! Crash after an append maxed the active segment, before rollover

use crate::crash::{child_log_dir, run_child_with_crash_point};
use segwal::crash_point::points;
use segwal::wal::{Log, LogConfig};
use tempfile::TempDir;

const CHILD: &str = "crash::scenarios::rollover::child_crash_before_rollover";

fn config() -> LogConfig {
    LogConfig::new(32, 0)
}

#[test]
fn child_crash_before_rollover() {
    let Some(dir) = child_log_dir() else {
        return;
    };
    let log = Log::open(&dir, config()).unwrap();
    assert_eq!(log.append(b"hello world").unwrap(), 0);
    log.flush().unwrap();

    // 38 bytes, past the 32 byte limit
    log.append(b"hello world").unwrap();
    unreachable!("crash point did not fire");
}

#[test]
fn test_flushed_record_survives_crash_before_rollover() {
    let temp_dir = TempDir::new().unwrap();

    let result = run_child_with_crash_point(CHILD, points::LOG_BEFORE_ROLLOVER, temp_dir.path());
    assert!(result.crashed(), "child should abort: {}", result.stderr);

    let log = Log::open(temp_dir.path(), config()).unwrap();
    assert_eq!(log.lowest_offset().unwrap(), 0);
    // The second append never returned and its frame was still buffered
    assert_eq!(log.highest_offset().unwrap(), Some(0));
    assert_eq!(log.read(0).unwrap(), b"hello world");
    assert_eq!(log.segment_count(), 1);

    assert_eq!(log.append(b"hello again").unwrap(), 1);
    assert_eq!(log.segment_count(), 2);
    assert_eq!(log.read(1).unwrap(), b"hello again");
}
