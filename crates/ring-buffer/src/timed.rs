//! Time-Windowed Event Log
//!
//! Entries are evicted two ways: FIFO when the log reaches capacity, and
//! lazily on read once they fall outside the trailing window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamped event history bounded by capacity and a trailing window
#[derive(Debug, Clone)]
pub struct TimedLog<T> {
    entries: VecDeque<(Instant, T)>,
    capacity: usize,
    window: Duration,
}

impl<T> TimedLog<T> {
    /// Create a log holding at most `capacity` entries, reporting only
    /// those within `window` of the read time
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            window,
        }
    }

    /// Record an event (drops the oldest if full)
    pub fn push(&mut self, at: Instant, value: T) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((at, value));
    }

    /// Evict entries older than the trailing window relative to `now`
    pub fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.entries.front() {
            if now.saturating_duration_since(*at) > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of events within the trailing window
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.entries.len()
    }

    /// Events within the trailing window, oldest first
    pub fn recent(&mut self, now: Instant) -> impl Iterator<Item = &T> {
        self.prune(now);
        self.entries.iter().map(|(_, value)| value)
    }

    /// Timestamp of the oldest retained entry
    pub fn oldest(&self) -> Option<Instant> {
        self.entries.front().map(|(at, _)| *at)
    }

    /// Number of retained entries (without pruning)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if log is empty (without pruning)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the log capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the trailing window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Clear the log
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
