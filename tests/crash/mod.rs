//! Crash testing framework for segwal
//!
//! Each scenario has a parent test and a child test. The parent re-runs
//! the test binary filtered to the child with `SEGWAL_CRASH_POINT` set;
//! the child writes to a log until the crash point aborts it. The parent
//! then reopens the log and checks what survived.

pub mod harness;
pub mod scenarios;

pub use harness::*;
