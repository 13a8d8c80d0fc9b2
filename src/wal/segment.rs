//! Store + index pair covering a contiguous offset range
//!
//! A segment named by `base_offset` owns `<base>.store` and `<base>.index`
//! in the log directory. Records inside it are addressed by absolute
//! offset; the index stores `offset - base_offset`.
//!
//! # Reopen validation
//!
//! A crash can leave the index padded to its mapped capacity (it was never
//! truncated) or the store carrying a frame whose index entry was never
//! written. On open the index is trusted up to its longest valid prefix:
//! entry `n` must carry relative offset `n`, must start where frame `n - 1`
//! ends, and its frame must end inside the store. A length prefix that
//! points past the store, or overflows `u64`, ends the prefix. Store bytes
//! past the last indexed frame are cut off.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::config::SegmentConfig;
use super::errors::{LogError, LogResult};
use super::index::{Index, IndexSlot, ENTRY_WIDTH};
use super::store::{Store, LEN_WIDTH};
use crate::crash_point::{maybe_crash, points};
use crate::observability::Event;

/// File extension of segment stores
pub const STORE_EXTENSION: &str = "store";
/// File extension of segment indexes
pub const INDEX_EXTENSION: &str = "index";

/// Returns the file name stem for a base offset.
pub fn segment_stem(base_offset: u64) -> String {
    format!("{:020}", base_offset)
}

/// Returns the store path of the segment at `base_offset`.
pub fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{}.{}", segment_stem(base_offset), STORE_EXTENSION))
}

/// Returns the index path of the segment at `base_offset`.
pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{}.{}", segment_stem(base_offset), INDEX_EXTENSION))
}

/// Snapshot of a segment's bounds and file sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub base_offset: u64,
    pub next_offset: u64,
    pub store_bytes: u64,
    pub index_bytes: u64,
}

/// One store and one index sharing a base offset.
pub struct Segment {
    base_offset: u64,
    next_offset: u64,
    store: Store,
    index: Index,
    config: SegmentConfig,
}

impl Segment {
    /// Opens or creates the segment at `base_offset` inside `dir`.
    pub fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> LogResult<Self> {
        let store = Store::open(&store_path(dir, base_offset))?;
        let mut index = Index::open(&index_path(dir, base_offset), &config)?;

        let (valid, indexed_end) = Self::valid_entries(&store, &index)?;
        if valid < index.len() {
            warn!(
                event = %Event::IndexRepair,
                base_offset,
                entries = index.len(),
                valid,
                "discarding index entries past the last valid frame"
            );
            index.truncate_entries(valid);
        }

        if store.size() > indexed_end {
            warn!(
                event = %Event::StoreRepair,
                base_offset,
                store_bytes = store.size(),
                indexed_bytes = indexed_end,
                "cutting unindexed bytes off the store"
            );
            store.truncate(indexed_end)?;
        }

        let next_offset = base_offset + index.len();
        Ok(Self {
            base_offset,
            next_offset,
            store,
            index,
            config,
        })
    }

    /// Counts the leading index entries that describe frames in the store.
    ///
    /// Returns the count and the store position where the last of those
    /// frames ends. Frames are packed from position 0, so each entry must
    /// start exactly where the previous frame ends. An entry that belongs
    /// here but starts elsewhere means the previous length prefix is wrong,
    /// and that frame is dropped too.
    fn valid_entries(store: &Store, index: &Index) -> LogResult<(u64, u64)> {
        let mut valid = 0u64;
        let mut start = 0u64;
        let mut end = 0u64;

        for n in 0..index.len() {
            let Ok(relative) = u32::try_from(n) else {
                break;
            };
            let Some((offset, position)) = index.read(IndexSlot::At(relative))? else {
                break;
            };
            if offset != relative {
                break;
            }
            if position != end {
                if valid > 0 {
                    valid -= 1;
                    end = start;
                }
                break;
            }
            let Some(next_end) = frame_end(store, position)? else {
                break;
            };
            start = position;
            end = next_end;
            valid = n + 1;
        }

        Ok((valid, end))
    }

    /// Returns the first offset of this segment.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns the offset the next append will get.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Returns the number of records in this segment.
    pub fn len(&self) -> u64 {
        self.next_offset - self.base_offset
    }

    /// Returns whether no record has been appended.
    pub fn is_empty(&self) -> bool {
        self.next_offset == self.base_offset
    }

    /// Returns whether `offset` falls inside this segment's range.
    pub fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// Returns bounds and sizes for inspection.
    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            base_offset: self.base_offset,
            next_offset: self.next_offset,
            store_bytes: self.store.size(),
            index_bytes: self.index.size(),
        }
    }

    /// Appends a record and returns its absolute offset.
    pub fn append(&mut self, payload: &[u8]) -> LogResult<u64> {
        let offset = self.next_offset;
        let relative = u32::try_from(offset - self.base_offset).map_err(|_| {
            LogError::IndexFull {
                path: self.index.path().to_path_buf(),
                capacity: self.index.capacity(),
            }
        })?;

        self.index.ensure_room()?;
        let (_, position) = self.store.append(payload)?;
        maybe_crash(points::SEGMENT_AFTER_STORE_APPEND);
        if let Err(e) = self.index.write(relative, position) {
            // A frame without an entry must not stay visible to store readers.
            self.store.truncate(position)?;
            return Err(e);
        }

        self.next_offset += 1;
        Ok(offset)
    }

    /// Reads the record at absolute `offset`.
    pub fn read(&self, offset: u64) -> LogResult<Vec<u8>> {
        let entry = offset
            .checked_sub(self.base_offset)
            .and_then(|relative| u32::try_from(relative).ok())
            .map(IndexSlot::At)
            .ok_or(LogError::OffsetOutOfRange { offset })?;

        let (_, position) = self
            .index
            .read(entry)?
            .ok_or(LogError::OffsetOutOfRange { offset })?;
        self.store.read(position)
    }

    /// Raw read of store bytes, used by the bulk log reader.
    pub fn read_store_at(&self, buf: &mut [u8], position: u64) -> LogResult<usize> {
        self.store.read_at(buf, position)
    }

    /// Returns whether either file reached its limit.
    ///
    /// The index counts as maxed once it cannot take one more entry, so
    /// `IndexFull` is never reached through [`Segment::append`] on a
    /// segment the log rolls over in time.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() + ENTRY_WIDTH > self.config.max_index_bytes
    }

    /// Flushes and fsyncs the store without closing.
    pub fn flush(&self) -> LogResult<()> {
        self.store.flush()
    }

    /// Closes index then store, attempting both.
    pub fn close(&mut self) -> LogResult<()> {
        let index_result = self.index.close();
        let store_result = self.store.close();
        index_result.and(store_result)
    }

    /// Closes the segment and deletes both files.
    pub fn remove(mut self) -> LogResult<()> {
        self.close()?;
        for path in [self.index.path(), self.store.path()] {
            fs::remove_file(path).map_err(|e| {
                LogError::io(format!("Failed to remove {}", path.display()), e)
            })?;
        }
        Ok(())
    }
}

/// Returns where the frame at `position` ends, or `None` when it does not
/// fit inside the store.
fn frame_end(store: &Store, position: u64) -> LogResult<Option<u64>> {
    let size = store.size();
    let body = match position.checked_add(LEN_WIDTH) {
        Some(body) if body <= size => body,
        _ => return Ok(None),
    };
    let len = frame_len(store, position)?;
    Ok(body.checked_add(len).filter(|&end| end <= size))
}

/// Reads the declared payload length of the frame at `position`.
fn frame_len(store: &Store, position: u64) -> LogResult<u64> {
    let mut len_buf = [0u8; LEN_WIDTH as usize];
    let n = store.read_at(&mut len_buf, position)?;
    if n < len_buf.len() {
        return Err(LogError::corruption(
            store.path(),
            position,
            "index points past the end of the store",
        ));
    }
    Ok(u64::from_be_bytes(len_buf))
}
