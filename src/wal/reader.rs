//! Bulk readers over raw log bytes
//!
//! [`LogReader`] streams the stores of every segment back to back, exactly
//! as persisted: a replica or snapshot consumer receives a sequence of
//! `[length: u64 BE][payload]` frames. [`FrameIter`] turns any such byte
//! stream back into payloads.

use std::io::{self, ErrorKind, Read};
use std::path::PathBuf;

use super::errors::{LogError, LogResult};
use super::log::Log;
use super::store::LEN_WIDTH;

/// Sequential reader over the raw store bytes of a log.
///
/// The shared log lock is taken per `read` call, never held between calls,
/// so appends proceed while a reader is draining. Segments truncated away
/// behind the cursor are skipped. After [`Log::reset`] the reader starts
/// again from the first frame of the reset log.
pub struct LogReader<'a> {
    log: &'a Log,
    /// Reset generation the cursor belongs to
    generation: u64,
    /// Base offset of the segment being read, `None` before the first read
    segment: Option<u64>,
    /// Byte position inside that segment's store
    position: u64,
}

impl<'a> LogReader<'a> {
    pub(crate) fn new(log: &'a Log) -> Self {
        Self {
            log,
            generation: log.state.read().generation,
            segment: None,
            position: 0,
        }
    }
}

impl Read for LogReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let state = self.log.state.read();
        let segments = state.open_segments().map_err(into_io)?;

        if self.generation != state.generation {
            self.generation = state.generation;
            self.segment = None;
            self.position = 0;
        }

        let mut idx = match self.segment {
            None => 0,
            Some(base) => segments.partition_point(|s| s.base_offset() < base),
        };

        while let Some(segment) = segments.get(idx) {
            if self.segment != Some(segment.base_offset()) {
                self.segment = Some(segment.base_offset());
                self.position = 0;
            }

            let n = segment
                .read_store_at(buf, self.position)
                .map_err(into_io)?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }
            idx += 1;
        }

        Ok(0)
    }
}

fn into_io(err: LogError) -> io::Error {
    io::Error::new(ErrorKind::Other, err)
}

/// Iterator over the payloads of a raw frame stream.
///
/// Yields `Err` once for a torn trailing frame or an I/O failure, then
/// stops.
pub struct FrameIter<R> {
    reader: R,
    /// Bytes consumed so far
    position: u64,
    done: bool,
}

impl<R: Read> FrameIter<R> {
    /// Wraps a reader positioned at a frame boundary.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            done: false,
        }
    }

    /// Returns the number of bytes consumed.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads the next payload, `Ok(None)` at a clean end of stream.
    pub fn read_next(&mut self) -> LogResult<Option<Vec<u8>>> {
        let mut len_buf = [0u8; LEN_WIDTH as usize];
        let filled = self.fill(&mut len_buf)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < len_buf.len() {
            return Err(self.torn(format!(
                "stream ends inside a length prefix ({} of {} bytes)",
                filled, LEN_WIDTH
            )));
        }

        let len = u64::from_be_bytes(len_buf);
        let mut payload = Vec::new();
        let read = (&mut self.reader)
            .take(len)
            .read_to_end(&mut payload)
            .map_err(|e| LogError::io("Failed to read frame body from stream", e))?;
        if (read as u64) < len {
            return Err(self.torn(format!(
                "frame declares {} bytes, stream holds {}",
                len, read
            )));
        }

        self.position += LEN_WIDTH + len;
        Ok(Some(payload))
    }

    /// Reads until `buf` is full or the stream ends.
    fn fill(&mut self, buf: &mut [u8]) -> LogResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(LogError::io("Failed to read frame length from stream", e)),
            }
        }
        Ok(filled)
    }

    fn torn(&self, reason: String) -> LogError {
        LogError::Corruption {
            path: PathBuf::from("<frame stream>"),
            position: self.position,
            reason,
        }
    }
}

impl<R: Read> Iterator for FrameIter<R> {
    type Item = LogResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
