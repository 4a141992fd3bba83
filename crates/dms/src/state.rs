//! Fatigue level and type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fatigue severity
///
/// Serialized with the collector's localized labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum FatigueLevel {
    #[default]
    #[serde(rename = "NINGUNO")]
    None,
    #[serde(rename = "BAJO")]
    Low,
    #[serde(rename = "MEDIO")]
    Medium,
    #[serde(rename = "ALTO")]
    High,
}

impl FatigueLevel {
    /// Localized label used on the wire
    pub fn label(&self) -> &'static str {
        match self {
            FatigueLevel::None => "NINGUNO",
            FatigueLevel::Low => "BAJO",
            FatigueLevel::Medium => "MEDIO",
            FatigueLevel::High => "ALTO",
        }
    }

    /// Internal code, used in logs
    pub fn code(&self) -> &'static str {
        match self {
            FatigueLevel::None => "NONE",
            FatigueLevel::Low => "LOW",
            FatigueLevel::Medium => "MEDIUM",
            FatigueLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for FatigueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Fatigue condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FatigueType {
    #[default]
    #[serde(rename = "NINGUNO")]
    None,
    #[serde(rename = "MICROSUEÑO")]
    MicroSleep,
    #[serde(rename = "CABECEO")]
    HeadNod,
    #[serde(rename = "DISTRAÍDO")]
    Distraction,
    #[serde(rename = "BOSTEZO")]
    Yawning,
    #[serde(rename = "CANSANCIO_VISUAL")]
    EyeStrain,
}

impl FatigueType {
    /// Localized label used on the wire
    pub fn label(&self) -> &'static str {
        match self {
            FatigueType::None => "NINGUNO",
            FatigueType::MicroSleep => "MICROSUEÑO",
            FatigueType::HeadNod => "CABECEO",
            FatigueType::Distraction => "DISTRAÍDO",
            FatigueType::Yawning => "BOSTEZO",
            FatigueType::EyeStrain => "CANSANCIO_VISUAL",
        }
    }

    /// Internal code, used in logs
    pub fn code(&self) -> &'static str {
        match self {
            FatigueType::None => "NONE",
            FatigueType::MicroSleep => "MICRO_SLEEP",
            FatigueType::HeadNod => "HEAD_NOD",
            FatigueType::Distraction => "DISTRACTION",
            FatigueType::Yawning => "YAWNING",
            FatigueType::EyeStrain => "EYE_STRAIN",
        }
    }
}

impl fmt::Display for FatigueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One (level, type) pair per analyzed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub level: FatigueLevel,
    pub fatigue_type: FatigueType,
}

impl Classification {
    pub const NONE: Self = Self::new(FatigueLevel::None, FatigueType::None);

    pub const fn new(level: FatigueLevel, fatigue_type: FatigueType) -> Self {
        Self { level, fatigue_type }
    }

    /// Whether any fatigue condition is present
    pub fn is_alert(&self) -> bool {
        self.level != FatigueLevel::None
    }
}
