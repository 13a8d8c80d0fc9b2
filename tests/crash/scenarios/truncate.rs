//! Crash part way through a truncation pass

use crate::crash::{child_log_dir, run_child_with_crash_point};
use segwal::crash_point::points;
use segwal::wal::{Log, LogConfig, LogError};
use tempfile::TempDir;

const CHILD: &str = "crash::scenarios::truncate::child_crash_during_truncate";

/// One record per segment
fn config() -> LogConfig {
    LogConfig::new(1, 0)
}

#[test]
fn child_crash_during_truncate() {
    let Some(dir) = child_log_dir() else {
        return;
    };
    let log = Log::open(&dir, config()).unwrap();
    log.truncate(1).unwrap();
    unreachable!("crash point did not fire");
}

#[test]
fn test_partial_truncate_leaves_consistent_log() {
    let temp_dir = TempDir::new().unwrap();
    {
        let log = Log::open(temp_dir.path(), config()).unwrap();
        for payload in [b"a", b"b", b"c"] {
            log.append(payload).unwrap();
        }
        log.close().unwrap();
    }

    let result = run_child_with_crash_point(CHILD, points::LOG_DURING_TRUNCATE, temp_dir.path());
    assert!(result.crashed(), "child should abort: {}", result.stderr);

    // Only the first segment went before the crash
    let log = Log::open(temp_dir.path(), config()).unwrap();
    assert_eq!(log.lowest_offset().unwrap(), 1);
    assert_eq!(log.highest_offset().unwrap(), Some(2));
    assert!(matches!(
        log.read(0).unwrap_err(),
        LogError::OffsetOutOfRange { offset: 0 }
    ));
    assert_eq!(log.read(1).unwrap(), b"b");

    // Running the truncation again finishes the job
    log.truncate(1).unwrap();
    assert_eq!(log.lowest_offset().unwrap(), 2);
    assert_eq!(log.read(2).unwrap(), b"c");
}
