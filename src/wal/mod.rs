//! Segmented write-ahead log
//!
//! Records are opaque byte payloads. Each accepted record gets the next
//! logical offset; the log can read it back by offset, stream every stored
//! frame for replication, or drop whole segments below a retention point.
//!
//! # Layers
//!
//! - [`Store`]: append-only file of `[length: u64 BE][payload]` frames
//! - [`Index`]: memory-mapped table of 12-byte `[relative offset][position]`
//!   entries
//! - [`Segment`]: one store and one index sharing a base offset
//! - [`Log`]: ordered segments with rollover, lookup and truncation
//!
//! # Invariants
//!
//! - Offsets are dense: a fresh log assigns 0, 1, 2, ...
//! - `segment.next_offset - segment.base_offset == index.size / 12`
//! - Segment ranges are contiguous; only the last segment takes appends
//! - A closed index is exactly `entries * 12` bytes on disk

mod config;
mod errors;
mod index;
mod log;
mod reader;
mod segment;
mod store;

pub use config::{LogConfig, SegmentConfig, DEFAULT_MAX_INDEX_BYTES, DEFAULT_MAX_STORE_BYTES};
pub use errors::{LogError, LogResult, Severity};
pub use index::{Index, IndexSlot, ENTRY_WIDTH, OFFSET_WIDTH, POSITION_WIDTH};
pub use log::Log;
pub use reader::{FrameIter, LogReader};
pub use segment::{index_path, segment_stem, store_path, Segment, SegmentInfo};
pub use store::{Store, LEN_WIDTH};
