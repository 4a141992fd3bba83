//! Bounded Sample Buffers
//!
//! Fixed-capacity containers for per-frame signal storage:
//! - `RollingWindow`: moving-average window over the last N samples
//! - `TimedLog`: timestamped event history with a trailing time window

mod buffer;
mod timed;

pub use buffer::{RollingWindow, DEFAULT_WINDOW};
pub use timed::TimedLog;
