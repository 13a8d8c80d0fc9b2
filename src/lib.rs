//! segwal - an embeddable, append-only, segmented write-ahead log
//!
//! Each appended record gets a monotonically increasing offset. Records
//! can be read back by offset, streamed in bulk for replication or
//! snapshots, and discarded below a retention boundary by truncation.
//!
//! ```no_run
//! use segwal::wal::{Log, LogConfig};
//!
//! # fn main() -> segwal::wal::LogResult<()> {
//! let log = Log::open("/var/lib/myservice/wal", LogConfig::default())?;
//! let offset = log.append(b"hello world")?;
//! assert_eq!(log.read(offset)?, b"hello world");
//! log.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! What to append, and when it is safe to truncate, is decided by the
//! embedding service; this crate only executes the storage mechanics.

pub mod crash_point;
pub mod observability;
pub mod wal;
