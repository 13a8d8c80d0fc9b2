//! Observability for segwal
//!
//! The library emits `tracing` events and never installs a subscriber;
//! embedding services decide where logs go. Each event carries an `event`
//! field holding a stable [`Event`] name plus structured fields such as
//! `base_offset` or `lowest`.

mod events;

pub use events::Event;
