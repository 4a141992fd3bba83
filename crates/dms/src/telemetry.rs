//! Telemetry payload sent to the fleet collector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::FatigueAnalysis;
use crate::state::{FatigueLevel, FatigueType};

/// Driver and vehicle the engine reports for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverIdentity {
    pub driver_id: String,
    pub vehicle_id: String,
}

impl Default for DriverIdentity {
    fn default() -> Self {
        Self {
            driver_id: "DEFAULT_DRIVER".to_string(),
            vehicle_id: "DEFAULT_VEHICLE".to_string(),
        }
    }
}

/// Immutable snapshot of one fatigue decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    pub driver_id: String,
    pub vehicle_id: String,
    pub timestamp: DateTime<Utc>,
    pub fatigue_level: FatigueLevel,
    pub fatigue_type: FatigueType,
    /// Seconds, two decimals
    pub eye_closure_duration: f64,
    pub yawn_count: u32,
    /// Blinks per minute, one decimal
    pub blink_rate: f64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl TelemetryPayload {
    /// Build from the engine's latest analysis
    pub fn from_analysis(
        identity: &DriverIdentity,
        analysis: &FatigueAnalysis,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            driver_id: identity.driver_id.clone(),
            vehicle_id: identity.vehicle_id.clone(),
            timestamp,
            fatigue_level: analysis.level(),
            fatigue_type: analysis.fatigue_type(),
            eye_closure_duration: round_to(analysis.eye_closure_duration, 2),
            yawn_count: u32::try_from(analysis.yawn_count).unwrap_or(u32::MAX),
            blink_rate: round_to(analysis.blink_rate as f64, 1),
        }
    }

    /// Out-of-band keepalive while no face is visible
    pub fn keepalive(identity: &DriverIdentity, timestamp: DateTime<Utc>) -> Self {
        Self {
            driver_id: identity.driver_id.clone(),
            vehicle_id: identity.vehicle_id.clone(),
            timestamp,
            fatigue_level: FatigueLevel::None,
            fatigue_type: FatigueType::None,
            eye_closure_duration: 0.0,
            yawn_count: 0,
            blink_rate: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Classification;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_wire_shape() {
        let analysis = FatigueAnalysis {
            classification: Classification::new(FatigueLevel::High, FatigueType::MicroSleep),
            eye_closure_duration: 1.23456,
            yawn_count: 2,
            blink_rate: 12,
            ..Default::default()
        };
        let payload = TelemetryPayload::from_analysis(
            &DriverIdentity { driver_id: "D-7".into(), vehicle_id: "V-42".into() },
            &analysis,
            fixed_time(),
        );

        let json: serde_json::Value = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["driverId"], "D-7");
        assert_eq!(json["vehicleId"], "V-42");
        assert_eq!(json["fatigueLevel"], "ALTO");
        assert_eq!(json["fatigueType"], "MICROSUEÑO");
        assert_eq!(json["eyeClosureDuration"], 1.23);
        assert_eq!(json["yawnCount"], 2);
        assert_eq!(json["blinkRate"], 12.0);
        assert!(json["timestamp"].as_str().unwrap().starts_with("2026-03-14T08:30:00"));
    }

    #[test]
    fn test_keepalive_is_neutral() {
        let payload = TelemetryPayload::keepalive(&DriverIdentity::default(), fixed_time());
        assert_eq!(payload.fatigue_level, FatigueLevel::None);
        assert_eq!(payload.fatigue_type, FatigueType::None);
        assert_eq!(payload.driver_id, "DEFAULT_DRIVER");
        assert_eq!(payload.yawn_count, 0);
    }

    #[test]
    fn test_parses_back_from_log_line() {
        let line = r#"{"driverId":"D","vehicleId":"V","timestamp":"2026-03-14T08:30:00+00:00","fatigueLevel":"MEDIO","fatigueType":"DISTRAÍDO","eyeClosureDuration":0.0,"yawnCount":1,"blinkRate":14.0}"#;
        let payload: TelemetryPayload = serde_json::from_str(line).unwrap();
        assert_eq!(payload.fatigue_type, FatigueType::Distraction);
        assert_eq!(payload.timestamp, fixed_time());
    }
}
