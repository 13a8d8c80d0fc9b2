//! Append-only record file
//!
//! A store is a sequence of frames:
//!
//! ```text
//! [length: u64 BE][payload: length bytes]
//! ```
//!
//! Appends go through a `BufWriter`; every read flushes it first so a
//! frame is readable as soon as `append` returns. Durability is reached on
//! `flush`/`close`, which fsync the file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::errors::{LogError, LogResult};

/// Width of the frame length prefix in bytes
pub const LEN_WIDTH: u64 = 8;

struct StoreInner {
    /// `None` once closed
    writer: Option<BufWriter<File>>,
    /// Logical size including buffered bytes
    size: u64,
}

/// Append-only file of length-prefixed payloads.
pub struct Store {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl Store {
    /// Opens or creates the store at `path`.
    ///
    /// Appends continue at the current end of the file.
    pub fn open(path: &Path) -> LogResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                LogError::io(format!("Failed to open store: {}", path.display()), e)
            })?;

        let size = file
            .metadata()
            .map_err(|e| {
                LogError::io(format!("Failed to stat store: {}", path.display()), e)
            })?
            .len();

        let mut writer = BufWriter::new(file);
        writer.seek(SeekFrom::Start(size)).map_err(|e| {
            LogError::io(format!("Failed to seek store: {}", path.display()), e)
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(StoreInner {
                writer: Some(writer),
                size,
            }),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the logical size in bytes, buffered frames included.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Appends one frame.
    ///
    /// Returns `(bytes_written, position)` where `position` is where the
    /// frame starts and `bytes_written` covers prefix and payload.
    pub fn append(&self, payload: &[u8]) -> LogResult<(u64, u64)> {
        let mut inner = self.inner.lock();
        let position = inner.size;
        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| LogError::Closed(self.path.display().to_string()))?;

        let len = payload.len() as u64;
        writer
            .write_all(&len.to_be_bytes())
            .and_then(|_| writer.write_all(payload))
            .map_err(|e| {
                LogError::io(
                    format!(
                        "Failed to append frame at {} to {}",
                        position,
                        self.path.display()
                    ),
                    e,
                )
            })?;

        let written = LEN_WIDTH + len;
        inner.size += written;
        Ok((written, position))
    }

    /// Reads the payload of the frame starting at `position`.
    pub fn read(&self, position: u64) -> LogResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        let size = inner.size;
        let file = Self::flushed_file(&mut inner, &self.path)?;

        if position.checked_add(LEN_WIDTH).map_or(true, |body| body > size) {
            return Err(LogError::corruption(
                &self.path,
                position,
                format!("length prefix runs past end of store ({} bytes)", size),
            ));
        }

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        read_exact_at(file, &mut len_buf, position).map_err(|e| {
            LogError::io(
                format!("Failed to read frame length from {}", self.path.display()),
                e,
            )
        })?;
        let len = u64::from_be_bytes(len_buf);

        let body_start = position + LEN_WIDTH;
        if len > size - body_start {
            return Err(LogError::corruption(
                &self.path,
                position,
                format!(
                    "short read: frame declares {} bytes, {} available",
                    len,
                    size - body_start
                ),
            ));
        }

        let mut payload = vec![0u8; len as usize];
        read_exact_at(file, &mut payload, body_start).map_err(|e| {
            LogError::io(
                format!("Failed to read frame body from {}", self.path.display()),
                e,
            )
        })?;
        Ok(payload)
    }

    /// Raw positioned read of up to `buf.len()` bytes at `offset`.
    ///
    /// Returns 0 at or past the end of the store.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> LogResult<usize> {
        let mut inner = self.inner.lock();
        let size = inner.size;
        let file = Self::flushed_file(&mut inner, &self.path)?;

        if offset >= size {
            return Ok(0);
        }
        let n = buf.len().min((size - offset) as usize);
        read_exact_at(file, &mut buf[..n], offset).map_err(|e| {
            LogError::io(
                format!("Failed to read {} at {}", self.path.display(), offset),
                e,
            )
        })?;
        Ok(n)
    }

    /// Flushes buffered frames and fsyncs the file.
    pub fn flush(&self) -> LogResult<()> {
        let mut inner = self.inner.lock();
        let file = Self::flushed_file(&mut inner, &self.path)?;
        file.sync_all().map_err(|e| LogError::fsync(&self.path, e))
    }

    /// Cuts the store back to `len` bytes, dropping any frames past it.
    ///
    /// Used on open to discard frames that never got an index entry.
    pub fn truncate(&self, len: u64) -> LogResult<()> {
        let mut inner = self.inner.lock();
        let file = Self::flushed_file(&mut inner, &self.path)?;
        file.set_len(len).map_err(|e| {
            LogError::io(format!("Failed to truncate {}", self.path.display()), e)
        })?;
        file.seek(SeekFrom::Start(len)).map_err(|e| {
            LogError::io(format!("Failed to seek {}", self.path.display()), e)
        })?;
        inner.size = len;
        Ok(())
    }

    /// Flushes, fsyncs and releases the file handle.
    ///
    /// Closing an already closed store is a no-op.
    pub fn close(&self) -> LogResult<()> {
        let mut inner = self.inner.lock();
        let Some(mut writer) = inner.writer.take() else {
            return Ok(());
        };
        writer.flush().map_err(|e| {
            LogError::io(format!("Failed to flush {}", self.path.display()), e)
        })?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| LogError::fsync(&self.path, e))
    }

    /// Flushes the write buffer and hands out the underlying file.
    fn flushed_file<'a>(inner: &'a mut StoreInner, path: &Path) -> LogResult<&'a mut File> {
        let writer = inner
            .writer
            .as_mut()
            .ok_or_else(|| LogError::Closed(path.display().to_string()))?;
        writer
            .flush()
            .map_err(|e| LogError::io(format!("Failed to flush {}", path.display()), e))?;
        Ok(writer.get_mut())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Reads exactly `buf.len()` bytes at `offset`, then restores the append
/// position at the end of the file.
fn read_exact_at(file: &mut File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    let result = file.read_exact(buf);
    file.seek(SeekFrom::End(0))?;
    result
}
