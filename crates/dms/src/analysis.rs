//! Fatigue classification and per-frame analysis results

use serde::{Deserialize, Serialize};

use crate::config::FatigueConfig;
use crate::detector::DetectorCounters;
use crate::signal::SmoothedMeasurement;
use crate::state::{Classification, FatigueLevel, FatigueType};

/// Yawns per minute at which yawning is reported
pub const YAWN_ALERT_COUNT: usize = 3;

/// Blink rate (per minute) at or above which eye strain is reported
pub const BLINK_RATE_HIGH: usize = 30;

/// Blink rate (per minute) at or below which eye strain is reported
pub const BLINK_RATE_LOW: usize = 5;

/// Detector outputs consumed by the classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierInputs {
    pub eye_closed_frames: u32,
    /// Nod counter already selected per `require_eyes_closed_for_nod`
    pub nod_frames: u32,
    pub yaw_frames: u32,
    pub yawn_count: usize,
    pub blink_rate: usize,
}

/// Apply the fixed priority order; the first matching rule wins
///
/// Note: with no blink history the rate is 0, which satisfies the
/// low-rate eye strain rule. This matches deployed behaviour.
pub fn classify(inputs: &ClassifierInputs, config: &FatigueConfig) -> Classification {
    if inputs.eye_closed_frames >= config.eye_closed_consec_frames {
        Classification::new(FatigueLevel::High, FatigueType::MicroSleep)
    } else if inputs.nod_frames >= config.head_nod_consec_frames {
        Classification::new(FatigueLevel::High, FatigueType::HeadNod)
    } else if inputs.yaw_frames >= config.head_yaw_consec_frames {
        Classification::new(FatigueLevel::Medium, FatigueType::Distraction)
    } else if inputs.yawn_count >= YAWN_ALERT_COUNT {
        Classification::new(FatigueLevel::Medium, FatigueType::Yawning)
    } else if inputs.blink_rate >= BLINK_RATE_HIGH || inputs.blink_rate <= BLINK_RATE_LOW {
        Classification::new(FatigueLevel::Low, FatigueType::EyeStrain)
    } else {
        Classification::NONE
    }
}

/// Complete per-frame analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FatigueAnalysis {
    /// Fatigue level and type for this frame
    pub classification: Classification,

    /// Current continuous eye closure (seconds)
    pub eye_closure_duration: f64,

    /// Sustained yawns in the trailing minute
    pub yawn_count: usize,

    /// Blinks in the trailing minute
    pub blink_rate: usize,

    /// Mean blink duration in the trailing minute (milliseconds)
    pub avg_blink_duration_ms: f64,

    /// Effective signal values used for this frame
    pub smoothed: SmoothedMeasurement,

    /// Raw detector counters
    pub counters: DetectorCounters,
}

impl FatigueAnalysis {
    pub fn level(&self) -> FatigueLevel {
        self.classification.level
    }

    pub fn fatigue_type(&self) -> FatigueType {
        self.classification.fatigue_type
    }

    /// Check if any fatigue condition is active
    pub fn has_alert(&self) -> bool {
        self.classification.is_alert()
    }
}
