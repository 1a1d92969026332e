//! Logging for the store.
//!
//! Everything the store reports about itself goes through [`Logger`]:
//! one JSON line per event, synchronous, deterministic field order.

mod logger;

pub use logger::{Logger, Severity};
