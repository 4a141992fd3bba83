//! Send cadence for per-frame analyses

use std::time::{Duration, Instant};

use dms::FatigueLevel;

use crate::config::SendConfig;

/// Rate-limits telemetry: faster while a fatigue condition is active
#[derive(Debug, Clone)]
pub struct SendScheduler {
    alert_interval: Duration,
    normal_interval: Duration,
    last_sent: Option<Instant>,
}

impl SendScheduler {
    pub fn new(config: &SendConfig) -> Self {
        Self {
            alert_interval: config.alert_interval(),
            normal_interval: config.normal_interval(),
            last_sent: None,
        }
    }

    fn due(&self, interval: Duration, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        }
    }

    /// Whether to ship the analysis for this frame; records the send
    pub fn should_send(&mut self, level: FatigueLevel, now: Instant) -> bool {
        let interval = if level == FatigueLevel::None {
            self.normal_interval
        } else {
            self.alert_interval
        };
        self.claim(interval, now)
    }

    /// Whether a keepalive is due on a frame without a face; records the send
    pub fn should_keepalive(&mut self, now: Instant) -> bool {
        self.claim(self.normal_interval, now)
    }

    fn claim(&mut self, interval: Duration, now: Instant) -> bool {
        if self.due(interval, now) {
            self.last_sent = Some(now);
            true
        } else {
            false
        }
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }
}
