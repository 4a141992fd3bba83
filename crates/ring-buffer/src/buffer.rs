//! Rolling Window Implementation

use std::collections::VecDeque;

/// Default window size (5 frames)
pub const DEFAULT_WINDOW: usize = 5;

/// Fixed-capacity moving-average window
#[derive(Debug, Clone)]
pub struct RollingWindow {
    /// Retained samples, oldest first
    samples: VecDeque<f64>,
    /// Capacity of the window
    capacity: usize,
}

impl RollingWindow {
    /// Create a new window with given capacity (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample (drops the oldest if full)
    pub fn push(&mut self, value: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Arithmetic mean of the retained samples
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Mean of the window, or `fallback` when nothing has been retained yet
    pub fn mean_or(&self, fallback: f64) -> f64 {
        self.mean().unwrap_or(fallback)
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Get the number of samples currently in the window
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if window is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Check if window is full
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Get the window capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the window
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
