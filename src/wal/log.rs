//! The segmented log
//!
//! A log is a directory of segments ordered by base offset. The last
//! segment is the active one and takes every append; once it is maxed a
//! new segment starting at its `next_offset` becomes active. Segment
//! ranges are contiguous, so the log presents one offset space running
//! from the first segment's base to the active segment's `next_offset - 1`.
//!
//! # Locking
//!
//! The segment list sits behind one `RwLock`. Appends, truncation, reset
//! and close take it exclusively, which makes rollover atomic with respect
//! to which segment is active. Reads and the bulk reader take it shared.

use std::collections::BTreeSet;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::config::LogConfig;
use super::errors::{LogError, LogResult};
use super::reader::{FrameIter, LogReader};
use super::segment::{Segment, SegmentInfo, INDEX_EXTENSION, STORE_EXTENSION};
use crate::crash_point::{maybe_crash, points};
use crate::observability::Event;

pub(crate) struct LogState {
    /// Sorted by base offset; never empty while open
    pub(crate) segments: Vec<Segment>,
    pub(crate) closed: bool,
    /// Bumped by every reset; readers holding an older value start over
    pub(crate) generation: u64,
}

impl LogState {
    fn active(&mut self) -> LogResult<&mut Segment> {
        if self.closed {
            return Err(LogError::Closed("log".to_string()));
        }
        self.segments
            .last_mut()
            .ok_or_else(|| LogError::Closed("log".to_string()))
    }

    pub(crate) fn open_segments(&self) -> LogResult<&[Segment]> {
        if self.closed || self.segments.is_empty() {
            return Err(LogError::Closed("log".to_string()));
        }
        Ok(&self.segments)
    }
}

/// Append-only, offset-addressed record log split into segments.
pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    pub(crate) state: RwLock<LogState>,
}

impl Log {
    /// Opens the log stored in `dir`, creating the directory and a first
    /// segment if needed.
    ///
    /// Zero limits in `config` are replaced by defaults. Existing segments
    /// are discovered from `<base>.store` / `<base>.index` file names.
    pub fn open(dir: impl AsRef<Path>, config: LogConfig) -> LogResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let config = config.with_defaults();
        config.validate()?;

        fs::create_dir_all(&dir).map_err(|e| {
            LogError::io(format!("Failed to create log directory: {}", dir.display()), e)
        })?;

        let segments = Self::load_segments(&dir, &config)?;
        let log = Self {
            dir,
            config,
            state: RwLock::new(LogState {
                segments,
                closed: false,
                generation: 0,
            }),
        };

        {
            let state = log.state.read();
            let segments = &state.segments;
            info!(
                event = %Event::LogOpen,
                dir = %log.dir.display(),
                segments = segments.len(),
                lowest = segments.first().map(Segment::base_offset),
                next = segments.last().map(Segment::next_offset),
                "log opened"
            );
        }
        Ok(log)
    }

    /// Opens every segment found in `dir`, or a fresh one at the initial
    /// offset.
    fn load_segments(dir: &Path, config: &LogConfig) -> LogResult<Vec<Segment>> {
        let mut base_offsets = BTreeSet::new();
        let entries = fs::read_dir(dir).map_err(|e| {
            LogError::io(format!("Failed to read log directory: {}", dir.display()), e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                LogError::io(format!("Failed to read log directory: {}", dir.display()), e)
            })?;
            let path = entry.path();
            let is_segment_file = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == STORE_EXTENSION || ext == INDEX_EXTENSION);
            if !is_segment_file {
                continue;
            }
            // The store and index of one segment share a base offset.
            if let Some(base) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                base_offsets.insert(base);
            }
        }

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base in base_offsets {
            segments.push(Segment::open(dir, base, config.segment)?);
        }

        for pair in segments.windows(2) {
            if pair[0].next_offset() != pair[1].base_offset() {
                warn!(
                    event = %Event::Corruption,
                    next_offset = pair[0].next_offset(),
                    following_base = pair[1].base_offset(),
                    "gap between segments; offsets in the gap are unreadable"
                );
            }
        }

        if segments.is_empty() {
            segments.push(Self::create_segment(
                dir,
                config,
                config.segment.initial_offset,
            )?);
        }

        // A crash between a final append and its rollover leaves the last
        // segment maxed.
        if let Some(last) = segments.last() {
            if last.is_maxed() {
                let base = last.next_offset();
                segments.push(Self::create_segment(dir, config, base)?);
            }
        }

        Ok(segments)
    }

    fn create_segment(dir: &Path, config: &LogConfig, base_offset: u64) -> LogResult<Segment> {
        let segment = Segment::open(dir, base_offset, config.segment)?;
        debug!(event = %Event::SegmentCreate, base_offset, "segment created");
        Ok(segment)
    }

    /// Returns the log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the effective configuration, defaults applied.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Appends a record and returns its offset.
    ///
    /// If the active segment is maxed afterwards a new active segment is
    /// created. A failure to create it fails the append even though the
    /// record itself is already stored; the next append retries the
    /// rollover first.
    pub fn append(&self, payload: &[u8]) -> LogResult<u64> {
        let mut state = self.state.write();

        if state.active()?.is_maxed() {
            self.roll_over(&mut state)?;
        }

        let offset = state.active()?.append(payload)?;

        if state.active()?.is_maxed() {
            maybe_crash(points::LOG_BEFORE_ROLLOVER);
            self.roll_over(&mut state)?;
        }

        Ok(offset)
    }

    fn roll_over(&self, state: &mut LogState) -> LogResult<()> {
        let active = state.active()?;
        let previous = active.base_offset();
        let base = active.next_offset();
        // The old segment takes no more appends; make it durable now.
        active.flush()?;

        let segment = Self::create_segment(&self.dir, &self.config, base)?;
        state.segments.push(segment);

        info!(
            event = %Event::SegmentRollover,
            previous_base = previous,
            base_offset = base,
            segments = state.segments.len(),
            "segment rolled over"
        );
        Ok(())
    }

    /// Reads the record at `offset`.
    pub fn read(&self, offset: u64) -> LogResult<Vec<u8>> {
        let state = self.state.read();
        let segments = state.open_segments()?;

        let idx = segments.partition_point(|s| s.base_offset() <= offset);
        let segment = idx
            .checked_sub(1)
            .map(|i| &segments[i])
            .filter(|s| s.contains(offset))
            .ok_or(LogError::OffsetOutOfRange { offset })?;

        segment.read(offset).map_err(|e| {
            if e.is_fatal() {
                error!(
                    event = %Event::Corruption,
                    offset,
                    base_offset = segment.base_offset(),
                    error = %e,
                    "record read failed"
                );
            }
            e
        })
    }

    /// Returns the first offset still held by the log.
    pub fn lowest_offset(&self) -> LogResult<u64> {
        let state = self.state.read();
        let segments = state.open_segments()?;
        Ok(segments[0].base_offset())
    }

    /// Returns the last assigned offset, or `None` when the log holds no
    /// record.
    pub fn highest_offset(&self) -> LogResult<Option<u64>> {
        let state = self.state.read();
        let segments = state.open_segments()?;
        let lowest = segments[0].base_offset();
        let next = segments[segments.len() - 1].next_offset();
        Ok(if next == lowest { None } else { Some(next - 1) })
    }

    /// Removes every segment whose records are all at or below `lowest`.
    ///
    /// When every segment goes, a new empty active segment is created at
    /// the old active segment's `next_offset` so appends keep working and
    /// offsets are never reused. Every eligible segment is attempted; the
    /// first removal error is returned.
    pub fn truncate(&self, lowest: u64) -> LogResult<()> {
        let mut state = self.state.write();
        let next_offset = state.active()?.next_offset();

        let mut first_err = None;
        let mut removed = 0usize;
        let mut kept = Vec::new();

        for segment in mem::take(&mut state.segments) {
            if segment.is_empty() || segment.next_offset() - 1 > lowest {
                kept.push(segment);
                continue;
            }

            let base_offset = segment.base_offset();
            match segment.remove() {
                Ok(()) => {
                    removed += 1;
                    debug!(event = %Event::SegmentRemove, base_offset, "segment removed");
                }
                Err(e) => {
                    warn!(
                        event = %Event::SegmentRemove,
                        base_offset,
                        error = %e,
                        "segment removal failed"
                    );
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
            maybe_crash(points::LOG_DURING_TRUNCATE);
        }

        if kept.is_empty() {
            match Self::create_segment(&self.dir, &self.config, next_offset) {
                Ok(segment) => kept.push(segment),
                Err(e) => {
                    // Nothing left to append to; the log cannot be used.
                    state.closed = true;
                    return Err(first_err.unwrap_or(e));
                }
            }
        }
        state.segments = kept;

        info!(
            event = %Event::LogTruncate,
            lowest,
            removed,
            remaining = state.segments.len(),
            "log truncated"
        );

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Returns a reader over the raw store bytes of every segment, in
    /// order, starting at the first frame of the lowest segment.
    pub fn reader(&self) -> LogReader<'_> {
        LogReader::new(self)
    }

    /// Iterates over every payload in the log, lowest offset first.
    pub fn frames(&self) -> FrameIter<LogReader<'_>> {
        FrameIter::new(self.reader())
    }

    /// Flushes and fsyncs the active segment's store.
    pub fn flush(&self) -> LogResult<()> {
        let mut state = self.state.write();
        state.active()?.flush()
    }

    /// Returns the number of segments.
    pub fn segment_count(&self) -> usize {
        self.state.read().segments.len()
    }

    /// Returns bounds and sizes of every segment, lowest first.
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.state.read().segments.iter().map(Segment::info).collect()
    }

    /// Closes every segment.
    ///
    /// All segments are closed even if one fails; the first error is
    /// returned. Closing a closed log is a no-op.
    pub fn close(&self) -> LogResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Ok(());
        }
        let result = Self::close_segments(&mut state);
        info!(event = %Event::LogClose, dir = %self.dir.display(), "log closed");
        result
    }

    fn close_segments(state: &mut LogState) -> LogResult<()> {
        let mut first_err = None;
        for mut segment in mem::take(&mut state.segments) {
            if let Err(e) = segment.close() {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        state.closed = true;
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Closes the log and deletes its directory.
    pub fn remove(self) -> LogResult<()> {
        self.close()?;
        fs::remove_dir_all(&self.dir).map_err(|e| {
            LogError::io(format!("Failed to remove log directory: {}", self.dir.display()), e)
        })?;
        info!(event = %Event::LogRemove, dir = %self.dir.display(), "log removed");
        Ok(())
    }

    /// Deletes every record and reopens the log empty at the configured
    /// initial offset.
    pub fn reset(&self) -> LogResult<()> {
        let mut state = self.state.write();
        if !state.closed {
            Self::close_segments(&mut state)?;
        }

        fs::remove_dir_all(&self.dir).map_err(|e| {
            LogError::io(format!("Failed to remove log directory: {}", self.dir.display()), e)
        })?;
        fs::create_dir_all(&self.dir).map_err(|e| {
            LogError::io(format!("Failed to create log directory: {}", self.dir.display()), e)
        })?;

        let initial_offset = self.config.segment.initial_offset;
        state.segments = vec![Self::create_segment(&self.dir, &self.config, initial_offset)?];
        state.closed = false;
        state.generation += 1;

        info!(event = %Event::LogReset, dir = %self.dir.display(), initial_offset, "log reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::index::ENTRY_WIDTH;
    use crate::wal::store::LEN_WIDTH;
    use tempfile::TempDir;

    const PAYLOAD: &[u8] = b"hello world";
    const FRAME: u64 = PAYLOAD.len() as u64 + LEN_WIDTH;

    fn open_log(dir: &TempDir, max_store_bytes: u64) -> Log {
        Log::open(dir.path(), LogConfig::new(max_store_bytes, 0)).unwrap()
    }

    #[test]
    fn test_fresh_log_has_one_empty_segment() {
        let temp_dir = TempDir::new().unwrap();
        let log = open_log(&temp_dir, 32);

        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), None);
    }

    #[test]
    fn test_append_read() {
        let temp_dir = TempDir::new().unwrap();
        let log = open_log(&temp_dir, 32);

        let offset = log.append(PAYLOAD).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(log.read(offset).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_offset_out_of_range() {
        let temp_dir = TempDir::new().unwrap();
        let log = open_log(&temp_dir, 32);

        let err = log.read(1).unwrap_err();
        assert!(matches!(err, LogError::OffsetOutOfRange { offset: 1 }));
    }

    #[test]
    fn test_rollover_at_store_limit() {
        let temp_dir = TempDir::new().unwrap();
        // Two frames reach the 32 byte limit
        let log = open_log(&temp_dir, 32);

        for i in 0..3 {
            assert_eq!(log.append(PAYLOAD).unwrap(), i);
        }

        let segments = log.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].base_offset, 0);
        assert_eq!(segments[0].next_offset, 2);
        assert_eq!(segments[0].store_bytes, FRAME * 2);
        assert_eq!(segments[1].base_offset, 2);
        assert_eq!(segments[1].next_offset, 3);
    }

    #[test]
    fn test_rollover_at_index_limit() {
        let temp_dir = TempDir::new().unwrap();
        let log = Log::open(temp_dir.path(), LogConfig::new(1024, ENTRY_WIDTH * 2)).unwrap();

        for _ in 0..5 {
            log.append(PAYLOAD).unwrap();
        }

        let bases: Vec<u64> = log.segments().iter().map(|s| s.base_offset).collect();
        assert_eq!(bases, vec![0, 2, 4]);
        for offset in 0..5 {
            assert_eq!(log.read(offset).unwrap(), PAYLOAD);
        }
    }

    #[test]
    fn test_truncate_removes_old_segments() {
        let temp_dir = TempDir::new().unwrap();
        let log = open_log(&temp_dir, 32);
        for _ in 0..3 {
            log.append(PAYLOAD).unwrap();
        }

        log.truncate(1).unwrap();

        assert_eq!(log.lowest_offset().unwrap(), 2);
        assert!(matches!(
            log.read(0).unwrap_err(),
            LogError::OffsetOutOfRange { offset: 0 }
        ));
        assert_eq!(log.read(2).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_truncate_everything_keeps_log_appendable() {
        let temp_dir = TempDir::new().unwrap();
        let log = open_log(&temp_dir, 1024);
        for _ in 0..3 {
            log.append(PAYLOAD).unwrap();
        }

        log.truncate(10).unwrap();

        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.lowest_offset().unwrap(), 3);
        assert_eq!(log.highest_offset().unwrap(), None);
        assert_eq!(log.append(PAYLOAD).unwrap(), 3);
        assert_eq!(log.highest_offset().unwrap(), Some(3));
    }

    #[test]
    fn test_truncate_below_first_segment_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let log = open_log(&temp_dir, 32);
        for _ in 0..3 {
            log.append(PAYLOAD).unwrap();
        }

        log.truncate(0).unwrap();
        assert_eq!(log.segment_count(), 2);
        assert_eq!(log.read(0).unwrap(), PAYLOAD);
    }

    #[test]
    fn test_initial_offset() {
        let temp_dir = TempDir::new().unwrap();
        let config = LogConfig::new(1024, 1024).with_initial_offset(100);
        let log = Log::open(temp_dir.path(), config).unwrap();

        assert_eq!(log.lowest_offset().unwrap(), 100);
        assert_eq!(log.append(PAYLOAD).unwrap(), 100);
        assert_eq!(log.highest_offset().unwrap(), Some(100));
    }

    #[test]
    fn test_closed_log_rejects_operations() {
        let temp_dir = TempDir::new().unwrap();
        let log = open_log(&temp_dir, 32);
        log.append(PAYLOAD).unwrap();
        log.close().unwrap();
        log.close().unwrap();

        assert_eq!(log.append(PAYLOAD).unwrap_err().code(), "SEGWAL_CLOSED");
        assert_eq!(log.read(0).unwrap_err().code(), "SEGWAL_CLOSED");
        assert!(log.lowest_offset().is_err());
    }

    #[test]
    fn test_reset_starts_over() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("log");
        let log = Log::open(&dir, LogConfig::new(32, 0)).unwrap();
        for _ in 0..3 {
            log.append(PAYLOAD).unwrap();
        }

        log.reset().unwrap();
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.highest_offset().unwrap(), None);
        assert_eq!(log.append(PAYLOAD).unwrap(), 0);
    }

    #[test]
    fn test_reader_restarts_after_reset() {
        let temp_dir = TempDir::new().unwrap();
        let log = Log::open(temp_dir.path(), LogConfig::new(1024, 0)).unwrap();
        log.append(b"a much longer record before the reset").unwrap();

        let mut reader = log.reader();
        let mut head = vec![0u8; LEN_WIDTH as usize + 4];
        std::io::Read::read_exact(&mut reader, &mut head).unwrap();

        log.reset().unwrap();
        log.append(b"after").unwrap();

        let mut rest = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut rest).unwrap();
        let mut expected = 5u64.to_be_bytes().to_vec();
        expected.extend_from_slice(b"after");
        assert_eq!(rest, expected);
    }

    #[test]
    fn test_remove_deletes_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("log");
        let log = Log::open(&dir, LogConfig::default()).unwrap();
        log.append(PAYLOAD).unwrap();

        log.remove().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_foreign_files_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"not a segment").unwrap();
        fs::write(temp_dir.path().join("abc.store"), b"").unwrap();

        let log = open_log(&temp_dir, 1024);
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.lowest_offset().unwrap(), 0);
    }
}
