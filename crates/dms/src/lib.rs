//! Driver Monitoring System (DMS)
//!
//! Temporal fatigue state engine over per-frame facial signals:
//! - Moving-average smoothing of EAR, MAR, head pitch and yaw
//! - Microsleep, blink rate, yawn, head nod and distraction detection
//! - Priority classification into a single (level, type) per frame
//! - One-shot frame-rate calibration of frame-count thresholds
//! - Telemetry payloads for the fleet collector

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod detector;
pub mod signal;
pub mod state;
pub mod telemetry;

pub use analysis::{classify, ClassifierInputs, FatigueAnalysis};
pub use calibration::{CalibrationReport, FpsCalibrator};
pub use config::FatigueConfig;
pub use detector::{
    BlinkDetector, DetectorCounters, EyeClosureDetector, HeadNodDetector, HeadYawDetector,
    YawnDetector,
};
pub use signal::{RawMeasurement, Signal, SignalCache, SmoothedMeasurement};
pub use state::{Classification, FatigueLevel, FatigueType};
pub use telemetry::{DriverIdentity, TelemetryPayload};

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),
}

/// Fatigue state engine
///
/// Owns all per-detector state. Runs synchronously on the frame path.
pub struct FatigueEngine {
    /// Configuration as loaded
    config: FatigueConfig,
    /// Working thresholds (rescaled by calibration)
    thresholds: FatigueConfig,
    cache: SignalCache,
    eye: EyeClosureDetector,
    blink: BlinkDetector,
    yawn: YawnDetector,
    nod: HeadNodDetector,
    yaw: HeadYawDetector,
    calibrator: FpsCalibrator,
    face_absent_frames: u64,
}

impl FatigueEngine {
    /// Create a new engine; the calibration clock starts now
    pub fn new(config: FatigueConfig) -> Result<Self, DmsError> {
        Self::with_start(config, Instant::now())
    }

    /// Create a new engine with an explicit calibration start time
    pub fn with_start(config: FatigueConfig, started: Instant) -> Result<Self, DmsError> {
        config.validate()?;
        info!(fps = config.fps, ear = config.ear_threshold, "Creating fatigue engine");

        Ok(Self {
            thresholds: config.clone(),
            cache: SignalCache::default(),
            eye: EyeClosureDetector::default(),
            blink: BlinkDetector::new(config.fps),
            yawn: YawnDetector::new(config.fps),
            nod: HeadNodDetector::default(),
            yaw: HeadYawDetector::default(),
            calibrator: FpsCalibrator::new(started),
            face_absent_frames: 0,
            config,
        })
    }

    /// Process one frame; `None` is the "no face" signal
    ///
    /// Returns no analysis for a frame without a face.
    pub fn process(
        &mut self,
        frame: Option<&RawMeasurement>,
        now: Instant,
    ) -> Result<Option<FatigueAnalysis>, DmsError> {
        self.calibrator.observe_frame();

        let Some(raw) = frame else {
            self.face_absent_frames += 1;
            return Ok(None);
        };
        self.face_absent_frames = 0;

        let analysis = self.analyze(raw, now)?;
        if let Some(report) = self.calibrator.try_calibrate(now, &mut self.thresholds) {
            info!(
                measured_fps = report.measured_fps,
                configured_fps = report.configured_fps,
                scale = report.scale,
                eye_closed_frames = report.eye_closed_consec_frames,
                head_nod_frames = report.head_nod_consec_frames,
                yawn_frames = report.yawn_consec_frames,
                head_yaw_frames = report.head_yaw_consec_frames,
                "Frame thresholds calibrated"
            );
        }
        Ok(Some(analysis))
    }

    /// Run smoothing, detectors and classification on one measurement
    pub fn analyze(&mut self, raw: &RawMeasurement, now: Instant) -> Result<FatigueAnalysis, DmsError> {
        check_measurement(raw)?;

        let smoothed = self.cache.smooth(raw);
        let t = &self.thresholds;

        self.blink.update(smoothed.ear, t, now);
        if self.yawn.update(&smoothed, t, now) {
            debug!("Sustained yawn recorded");
        }
        self.eye.update(smoothed.ear, t);
        self.nod.update(&smoothed, t);
        self.yaw.update(smoothed.head_yaw_deg, t);

        let blink_rate = self.blink.rate(now);
        let yawn_count = self.yawn.count(now);

        let inputs = ClassifierInputs {
            eye_closed_frames: self.eye.closed_frames(),
            nod_frames: self.nod.effective_frames(t),
            yaw_frames: self.yaw.away_frames(),
            yawn_count,
            blink_rate,
        };
        let classification = classify(&inputs, t);

        Ok(FatigueAnalysis {
            classification,
            eye_closure_duration: self.eye.duration_secs(t.fps),
            yawn_count,
            blink_rate,
            avg_blink_duration_ms: self.blink.avg_duration_ms(now),
            smoothed,
            counters: self.counters(),
        })
    }

    /// Current detector counters
    pub fn counters(&self) -> DetectorCounters {
        DetectorCounters {
            eye_closed_frames: self.eye.closed_frames(),
            yawn_frames: self.yawn.open_frames(),
            head_nod_frames: self.nod.nod_frames(),
            head_nod_eyes_closed_frames: self.nod.nod_eyes_closed_frames(),
            head_yaw_frames: self.yaw.away_frames(),
        }
    }

    /// Configuration as loaded
    pub fn config(&self) -> &FatigueConfig {
        &self.config
    }

    /// Thresholds in effect (after calibration, if it has run)
    pub fn thresholds(&self) -> &FatigueConfig {
        &self.thresholds
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    /// Consecutive frames without a face
    pub fn face_absent_frames(&self) -> u64 {
        self.face_absent_frames
    }

    /// Reset driver state (on driver change); calibration is kept
    pub fn reset(&mut self) {
        self.cache.clear();
        self.eye.reset();
        self.blink.reset();
        self.yawn.reset();
        self.nod.reset();
        self.yaw.reset();
        self.face_absent_frames = 0;
    }
}

fn check_measurement(raw: &RawMeasurement) -> Result<(), DmsError> {
    let fields = [
        ("ear", raw.ear),
        ("mar", raw.mar),
        ("head_pitch_deg", raw.head_pitch_deg),
        ("head_yaw_deg", raw.head_yaw_deg),
    ];
    for (name, value) in fields {
        if !value.is_finite() {
            return Err(DmsError::InvalidMeasurement(format!("{name} is not finite")));
        }
    }
    if raw.ear < 0.0 || raw.mar < 0.0 {
        return Err(DmsError::InvalidMeasurement(
            "aspect ratios must be non-negative".into(),
        ));
    }
    Ok(())
}
