//! Memory-mapped offset index
//!
//! Each entry is 12 bytes:
//!
//! ```text
//! [relative_offset: u32 BE][store_position: u64 BE]
//! ```
//!
//! Entry `n` lives at byte `n * ENTRY_WIDTH`, so lookups are arithmetic,
//! never a scan. While open the file is extended to `max_index_bytes` and
//! mapped in full; `size` counts the bytes actually in use. Closing
//! truncates the file back to `size`, which is what the next open reads
//! back from file metadata.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

use super::config::SegmentConfig;
use super::errors::{LogError, LogResult};

/// Width of the relative offset field
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store position field
pub const POSITION_WIDTH: u64 = 8;
/// Width of a full index entry
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Which entry to read from an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSlot {
    /// The most recently written entry
    Last,
    /// The entry for a relative offset
    At(u32),
}

/// Fixed-width relative offset → store position table.
pub struct Index {
    path: PathBuf,
    /// `None` once closed
    file: Option<File>,
    mmap: Option<MmapMut>,
    size: u64,
}

impl Index {
    /// Opens or creates the index at `path` and maps
    /// `config.max_index_bytes` of it.
    pub fn open(path: &Path, config: &SegmentConfig) -> LogResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                LogError::io(format!("Failed to open index: {}", path.display()), e)
            })?;

        let on_disk = file
            .metadata()
            .map_err(|e| {
                LogError::io(format!("Failed to stat index: {}", path.display()), e)
            })?
            .len();

        // A partial trailing entry can only come from a torn write.
        let size = on_disk - on_disk % ENTRY_WIDTH;
        let capacity = config.max_index_bytes.max(size);

        file.set_len(capacity).map_err(|e| {
            LogError::io(
                format!("Failed to preallocate index: {}", path.display()),
                e,
            )
        })?;

        // SAFETY: the file is opened read/write, owned by this index for the
        // lifetime of the mapping, and sized to `capacity` before mapping.
        // Every access is bounds-checked against `size` or the map length.
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            LogError::io(format!("Failed to map index: {}", path.display()), e)
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            mmap: Some(mmap),
            size,
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of bytes in use.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the number of entries written.
    pub fn len(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Returns whether no entry has been written.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the mapped capacity in bytes, 0 once closed.
    pub fn capacity(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |m| m.len() as u64)
    }

    /// Reads one entry.
    ///
    /// Returns `Ok(None)` when the slot has not been written, even if the
    /// mapped capacity extends past it.
    pub fn read(&self, slot: IndexSlot) -> LogResult<Option<(u32, u64)>> {
        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| LogError::Closed(self.path.display().to_string()))?;

        if self.size == 0 {
            return Ok(None);
        }

        let entry = match slot {
            IndexSlot::Last => self.len() - 1,
            IndexSlot::At(relative) => u64::from(relative),
        };

        let start = entry * ENTRY_WIDTH;
        if start + ENTRY_WIDTH > self.size {
            return Ok(None);
        }

        Ok(Some(decode_entry(&mmap[start as usize..(start + ENTRY_WIDTH) as usize])))
    }

    /// Appends an entry after the last one written.
    ///
    /// Callers write relative offsets in increasing order; this is not
    /// checked here.
    pub fn write(&mut self, relative_offset: u32, position: u64) -> LogResult<()> {
        self.ensure_room()?;
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| LogError::Closed(self.path.display().to_string()))?;

        let start = self.size as usize;
        let end = start + ENTRY_WIDTH as usize;
        encode_entry(&mut mmap[start..end], relative_offset, position);
        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Fails with `Closed` or `IndexFull` when [`Index::write`] would.
    pub fn ensure_room(&self) -> LogResult<()> {
        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| LogError::Closed(self.path.display().to_string()))?;
        if (mmap.len() as u64) < self.size + ENTRY_WIDTH {
            return Err(LogError::IndexFull {
                path: self.path.clone(),
                capacity: mmap.len() as u64,
            });
        }
        Ok(())
    }

    /// Drops entries past the first `entries`.
    ///
    /// Only used while validating an index on open.
    pub(crate) fn truncate_entries(&mut self, entries: u64) {
        self.size = self.size.min(entries * ENTRY_WIDTH);
    }

    /// Flushes the mapping, fsyncs, truncates the file to the used size and
    /// releases it.
    ///
    /// Closing an already closed index is a no-op.
    pub fn close(&mut self) -> LogResult<()> {
        let (Some(mmap), Some(file)) = (self.mmap.take(), self.file.take()) else {
            return Ok(());
        };

        mmap.flush_async().map_err(|e| {
            LogError::io(format!("Failed to flush index map: {}", self.path.display()), e)
        })?;
        mmap.flush()
            .map_err(|e| LogError::fsync(&self.path, e))?;
        // The file cannot shrink below a live mapping on every platform.
        drop(mmap);

        file.sync_all().map_err(|e| LogError::fsync(&self.path, e))?;
        file.set_len(self.size).map_err(|e| {
            LogError::io(format!("Failed to truncate index: {}", self.path.display()), e)
        })?;
        file.sync_all().map_err(|e| LogError::fsync(&self.path, e))
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn encode_entry(buf: &mut [u8], relative_offset: u32, position: u64) {
    let split = OFFSET_WIDTH as usize;
    buf[..split].copy_from_slice(&relative_offset.to_be_bytes());
    buf[split..].copy_from_slice(&position.to_be_bytes());
}

fn decode_entry(buf: &[u8]) -> (u32, u64) {
    let mut offset = [0u8; OFFSET_WIDTH as usize];
    let mut position = [0u8; POSITION_WIDTH as usize];
    offset.copy_from_slice(&buf[..OFFSET_WIDTH as usize]);
    position.copy_from_slice(&buf[OFFSET_WIDTH as usize..]);
    (u32::from_be_bytes(offset), u64::from_be_bytes(position))
}
