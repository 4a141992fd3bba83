//! Eye, mouth, and head pose event detectors
//!
//! Every detector runs on smoothed signals. Frame counters are monotone
//! while their condition holds and reset to zero as soon as it fails.

use std::time::{Duration, Instant};

use ring_buffer::TimedLog;
use serde::{Deserialize, Serialize};

use crate::config::FatigueConfig;
use crate::signal::SmoothedMeasurement;

/// Trailing window for blink rate and yawn count
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// History retained per log, in minutes of frames
const HISTORY_MINUTES: usize = 2;

fn history_capacity(fps: u32) -> usize {
    (fps.max(1) as usize) * 60 * HISTORY_MINUTES
}

fn head_down(pitch_eff: f64, config: &FatigueConfig) -> bool {
    pitch_eff < -config.head_pitch_down_threshold
}

/// Sustained eye closure (microsleep) detector
#[derive(Debug, Clone, Default)]
pub struct EyeClosureDetector {
    closed_frames: u32,
}

impl EyeClosureDetector {
    pub fn update(&mut self, ear_eff: f64, config: &FatigueConfig) {
        if ear_eff < config.ear_threshold {
            self.closed_frames = self.closed_frames.saturating_add(1);
        } else {
            self.closed_frames = 0;
        }
    }

    pub fn closed_frames(&self) -> u32 {
        self.closed_frames
    }

    /// Current closure duration in seconds
    pub fn duration_secs(&self, fps: u32) -> f64 {
        self.closed_frames as f64 / fps.max(1) as f64
    }

    pub fn reset(&mut self) {
        self.closed_frames = 0;
    }
}

/// Edge-triggered blink detector with a per-minute rate
#[derive(Debug, Clone)]
pub struct BlinkDetector {
    closed_since: Option<Instant>,
    /// (completion time, blink duration in seconds)
    log: TimedLog<f64>,
}

impl BlinkDetector {
    pub fn new(fps: u32) -> Self {
        Self {
            closed_since: None,
            log: TimedLog::new(history_capacity(fps), RATE_WINDOW),
        }
    }

    /// Returns the blink duration when a blink just completed
    pub fn update(&mut self, ear_eff: f64, config: &FatigueConfig, now: Instant) -> Option<Duration> {
        if ear_eff < config.ear_threshold {
            if self.closed_since.is_none() {
                self.closed_since = Some(now);
            }
            None
        } else if let Some(start) = self.closed_since.take() {
            let duration = now.saturating_duration_since(start);
            self.log.push(now, duration.as_secs_f64());
            Some(duration)
        } else {
            None
        }
    }

    /// Blinks completed within the trailing minute
    pub fn rate(&mut self, now: Instant) -> usize {
        self.log.count(now)
    }

    /// Mean blink duration within the trailing minute (milliseconds)
    pub fn avg_duration_ms(&mut self, now: Instant) -> f64 {
        let (count, total) = self
            .log
            .recent(now)
            .fold((0usize, 0.0f64), |(n, sum), d| (n + 1, sum + d));
        if count == 0 {
            0.0
        } else {
            total / count as f64 * 1000.0
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed_since.is_some()
    }

    pub fn reset(&mut self) {
        self.closed_since = None;
        self.log.clear();
    }
}

/// Sustained-yawn detector
#[derive(Debug, Clone)]
pub struct YawnDetector {
    open_frames: u32,
    log: TimedLog<()>,
}

impl YawnDetector {
    pub fn new(fps: u32) -> Self {
        Self {
            open_frames: 0,
            log: TimedLog::new(history_capacity(fps), RATE_WINDOW),
        }
    }

    /// Returns true when a sustained yawn just ended on this frame
    pub fn update(
        &mut self,
        smoothed: &SmoothedMeasurement,
        config: &FatigueConfig,
        now: Instant,
    ) -> bool {
        // Head-down mouth opening is not a yawn (e.g. looking at the dashboard)
        if config.ignore_yawn_if_head_down && head_down(smoothed.head_pitch_deg, config) {
            self.open_frames = 0;
            return false;
        }

        if smoothed.mar > config.mar_threshold {
            self.open_frames = self.open_frames.saturating_add(1);
            return false;
        }

        let completed = self.open_frames >= config.yawn_consec_frames;
        if completed {
            self.log.push(now, ());
        }
        self.open_frames = 0;
        completed
    }

    /// Sustained yawns within the trailing minute
    pub fn count(&mut self, now: Instant) -> usize {
        self.log.count(now)
    }

    pub fn open_frames(&self) -> u32 {
        self.open_frames
    }

    pub fn reset(&mut self) {
        self.open_frames = 0;
        self.log.clear();
    }
}

/// Head-nod detector with a joint head-down + eyes-closed counter
#[derive(Debug, Clone, Default)]
pub struct HeadNodDetector {
    nod_frames: u32,
    nod_eyes_closed_frames: u32,
}

impl HeadNodDetector {
    pub fn update(&mut self, smoothed: &SmoothedMeasurement, config: &FatigueConfig) {
        if !head_down(smoothed.head_pitch_deg, config) {
            self.nod_frames = 0;
            self.nod_eyes_closed_frames = 0;
            return;
        }

        self.nod_frames = self.nod_frames.saturating_add(1);

        let eyes_closed = smoothed.ear < config.ear_threshold;
        let mouth_open = smoothed.mar > config.mar_threshold;
        if eyes_closed && !(config.ignore_nod_if_yawning && mouth_open) {
            self.nod_eyes_closed_frames = self.nod_eyes_closed_frames.saturating_add(1);
        } else {
            self.nod_eyes_closed_frames = 0;
        }
    }

    /// Counter the classifier compares against the nod threshold
    pub fn effective_frames(&self, config: &FatigueConfig) -> u32 {
        if config.require_eyes_closed_for_nod {
            self.nod_eyes_closed_frames
        } else {
            self.nod_frames
        }
    }

    pub fn nod_frames(&self) -> u32 {
        self.nod_frames
    }

    pub fn nod_eyes_closed_frames(&self) -> u32 {
        self.nod_eyes_closed_frames
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Sideways head rotation (distraction) detector
#[derive(Debug, Clone, Default)]
pub struct HeadYawDetector {
    away_frames: u32,
}

impl HeadYawDetector {
    pub fn update(&mut self, yaw_eff: f64, config: &FatigueConfig) {
        if yaw_eff.abs() > config.head_yaw_threshold {
            self.away_frames = self.away_frames.saturating_add(1);
        } else {
            self.away_frames = 0;
        }
    }

    pub fn away_frames(&self) -> u32 {
        self.away_frames
    }

    pub fn reset(&mut self) {
        self.away_frames = 0;
    }
}

/// Snapshot of detector counters, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetectorCounters {
    pub eye_closed_frames: u32,
    pub yawn_frames: u32,
    pub head_nod_frames: u32,
    pub head_nod_eyes_closed_frames: u32,
    pub head_yaw_frames: u32,
}
