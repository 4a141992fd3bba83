//! DMS configuration

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Fatigue engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// Eye aspect ratio below which eyes count as closed
    pub ear_threshold: f64,

    /// Mouth aspect ratio above which the mouth counts as open
    pub mar_threshold: f64,

    /// Consecutive closed-eye frames for a microsleep
    pub eye_closed_consec_frames: u32,

    /// Consecutive head-down frames for a head nod
    pub head_nod_consec_frames: u32,

    /// Consecutive open-mouth frames for a sustained yawn
    pub yawn_consec_frames: u32,

    /// Head pitch (degrees, downward) beyond which the head counts as down
    pub head_pitch_down_threshold: f64,

    /// Absolute head yaw (degrees) beyond which the driver counts as looking away
    pub head_yaw_threshold: f64,

    /// Consecutive looking-away frames for a distraction
    pub head_yaw_consec_frames: u32,

    /// Nominal camera frame rate the frame thresholds are expressed in
    pub fps: u32,

    /// Only count a nod while the eyes are also closed
    pub require_eyes_closed_for_nod: bool,

    /// Treat head-down with open mouth as a yawn rather than a nod
    pub ignore_nod_if_yawning: bool,

    /// Skip yawn tracking while the head is down
    pub ignore_yawn_if_head_down: bool,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.24,
            mar_threshold: 0.65,
            eye_closed_consec_frames: 20,
            head_nod_consec_frames: 30,
            yawn_consec_frames: 15,
            head_pitch_down_threshold: 20.0,
            head_yaw_threshold: 30.0,
            head_yaw_consec_frames: 20,
            fps: 20,
            require_eyes_closed_for_nod: true,
            ignore_nod_if_yawning: true,
            ignore_yawn_if_head_down: true,
        }
    }
}

impl FatigueConfig {
    /// Create strict config (shorter sustain windows)
    pub fn strict() -> Self {
        Self {
            eye_closed_consec_frames: 14,
            head_nod_consec_frames: 20,
            head_yaw_consec_frames: 14,
            head_yaw_threshold: 25.0,
            ..Default::default()
        }
    }

    /// Create lenient config (longer sustain windows)
    pub fn lenient() -> Self {
        Self {
            eye_closed_consec_frames: 30,
            head_nod_consec_frames: 40,
            head_yaw_consec_frames: 40,
            head_yaw_threshold: 40.0,
            ..Default::default()
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.fps == 0 {
            return Err(DmsError::Config("fps must be greater than zero".into()));
        }

        let frame_counts = [
            ("eye_closed_consec_frames", self.eye_closed_consec_frames),
            ("head_nod_consec_frames", self.head_nod_consec_frames),
            ("yawn_consec_frames", self.yawn_consec_frames),
            ("head_yaw_consec_frames", self.head_yaw_consec_frames),
        ];
        for (name, value) in frame_counts {
            if value == 0 {
                return Err(DmsError::Config(format!("{name} must be at least 1")));
            }
        }

        let thresholds = [
            ("ear_threshold", self.ear_threshold),
            ("mar_threshold", self.mar_threshold),
            ("head_pitch_down_threshold", self.head_pitch_down_threshold),
            ("head_yaw_threshold", self.head_yaw_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(DmsError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(FatigueConfig::default().validate().is_ok());
        assert!(FatigueConfig::strict().validate().is_ok());
        assert!(FatigueConfig::lenient().validate().is_ok());
    }

    #[test]
    fn test_zero_fps_rejected() {
        let config = FatigueConfig { fps: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(DmsError::Config(_))));
    }

    #[test]
    fn test_zero_frame_count_rejected() {
        let config = FatigueConfig { yawn_consec_frames: 0, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("yawn_consec_frames"));
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let config = FatigueConfig { ear_threshold: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: FatigueConfig =
            serde_json::from_str(r#"{"ear_threshold": 0.2, "fps": 30}"#).unwrap();
        assert_eq!(config.ear_threshold, 0.2);
        assert_eq!(config.fps, 30);
        assert_eq!(config.eye_closed_consec_frames, 20);
        assert!(config.require_eyes_closed_for_nod);
    }
}
