//! One-shot frame-rate calibration
//!
//! Frame-count thresholds are configured for a nominal FPS. Once the real
//! rate is known they are rescaled so that time-based meaning is kept.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::FatigueConfig;

/// Wall-clock time observed before measuring
pub const CALIBRATION_DELAY: Duration = Duration::from_secs(2);

/// Outcome of the calibration step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub measured_fps: u32,
    pub configured_fps: u32,
    pub scale: f64,
    pub eye_closed_consec_frames: u32,
    pub head_nod_consec_frames: u32,
    pub yawn_consec_frames: u32,
    pub head_yaw_consec_frames: u32,
}

/// Frame-rate calibrator; applies at most once
#[derive(Debug, Clone)]
pub struct FpsCalibrator {
    started: Instant,
    frames: u64,
    done: bool,
}

fn scale_frames(frames: u32, scale: f64) -> u32 {
    let scaled = (frames as f64 * scale).round();
    if scaled.is_finite() && scaled >= 1.0 {
        scaled.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

impl FpsCalibrator {
    pub fn new(started: Instant) -> Self {
        Self { started, frames: 0, done: false }
    }

    /// Count one processed frame
    pub fn observe_frame(&mut self) {
        self.frames += 1;
    }

    pub fn frames_observed(&self) -> u64 {
        self.frames
    }

    pub fn is_calibrated(&self) -> bool {
        self.done
    }

    /// Rescale thresholds in place if due; returns the report the one time it runs
    pub fn try_calibrate(
        &mut self,
        now: Instant,
        thresholds: &mut FatigueConfig,
    ) -> Option<CalibrationReport> {
        if self.done || self.frames == 0 {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < CALIBRATION_DELAY {
            return None;
        }

        let measured = (self.frames as f64 / elapsed.as_secs_f64()).round().max(1.0) as u32;
        let configured = thresholds.fps.max(1);
        let scale = measured as f64 / configured as f64;

        thresholds.eye_closed_consec_frames = scale_frames(thresholds.eye_closed_consec_frames, scale);
        thresholds.head_nod_consec_frames = scale_frames(thresholds.head_nod_consec_frames, scale);
        thresholds.yawn_consec_frames = scale_frames(thresholds.yawn_consec_frames, scale);
        thresholds.head_yaw_consec_frames = scale_frames(thresholds.head_yaw_consec_frames, scale);
        thresholds.fps = measured;
        self.done = true;

        Some(CalibrationReport {
            measured_fps: measured,
            configured_fps: configured,
            scale,
            eye_closed_consec_frames: thresholds.eye_closed_consec_frames,
            head_nod_consec_frames: thresholds.head_nod_consec_frames,
            yawn_consec_frames: thresholds.yawn_consec_frames,
            head_yaw_consec_frames: thresholds.head_yaw_consec_frames,
        })
    }
}
