//! Crash between the store write and the index write of an append
//!
//! The frame reaches the store file but never gets an index entry. On
//! reopen the index is trusted and the orphan frame is cut off.

use crate::crash::{child_log_dir, run_child_with_crash_point};
use segwal::crash_point::points;
use segwal::wal::{Log, LogConfig, LEN_WIDTH};
use tempfile::TempDir;

const CHILD: &str = "crash::scenarios::append::child_crash_after_store_append";

/// Larger than the store's write buffer, so the frame body hits the file
/// before the crash.
const ORPHAN_LEN: usize = 16 * 1024;

fn config() -> LogConfig {
    LogConfig::new(1024 * 1024, 1024)
}

#[test]
fn child_crash_after_store_append() {
    let Some(dir) = child_log_dir() else {
        return;
    };
    let log = Log::open(&dir, config()).unwrap();
    log.append(&vec![0xAB; ORPHAN_LEN]).unwrap();
    unreachable!("crash point did not fire");
}

#[test]
fn test_orphan_frame_is_discarded_on_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let payloads: Vec<Vec<u8>> = (0..3).map(|i| format!("record-{}", i).into_bytes()).collect();

    {
        let log = Log::open(temp_dir.path(), config()).unwrap();
        for payload in &payloads {
            log.append(payload).unwrap();
        }
        log.close().unwrap();
    }

    let result = run_child_with_crash_point(
        CHILD,
        points::SEGMENT_AFTER_STORE_APPEND,
        temp_dir.path(),
    );
    assert!(result.crashed(), "child should abort: {}", result.stderr);

    let log = Log::open(temp_dir.path(), config()).unwrap();
    assert_eq!(log.highest_offset().unwrap(), Some(2));

    let indexed_bytes: u64 = payloads.iter().map(|p| LEN_WIDTH + p.len() as u64).sum();
    assert_eq!(log.segments()[0].store_bytes, indexed_bytes);

    for (offset, payload) in payloads.iter().enumerate() {
        assert_eq!(&log.read(offset as u64).unwrap(), payload);
    }

    // Numbering resumes where the acknowledged records ended
    assert_eq!(log.append(b"after crash").unwrap(), 3);
    assert_eq!(log.read(3).unwrap(), b"after crash");
}

#[test]
fn test_crash_on_fresh_log_adopts_complete_first_frame() {
    let temp_dir = TempDir::new().unwrap();

    let result = run_child_with_crash_point(
        CHILD,
        points::SEGMENT_AFTER_STORE_APPEND,
        temp_dir.path(),
    );
    assert!(result.crashed(), "child should abort: {}", result.stderr);

    // The index was left zero-padded to its full capacity, and a zeroed
    // first slot reads as offset 0 at position 0. The frame there is whole,
    // so it is kept.
    let log = Log::open(temp_dir.path(), config()).unwrap();
    assert_eq!(log.highest_offset().unwrap(), Some(0));
    assert_eq!(log.read(0).unwrap(), vec![0xAB; ORPHAN_LEN]);
    assert_eq!(log.append(b"second").unwrap(), 1);
}
