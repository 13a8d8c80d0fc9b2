//! Crash scenarios, one module per crash point

pub mod append;
pub mod rollover;
pub mod truncate;
