//! Per-signal smoothing

use ring_buffer::{RollingWindow, DEFAULT_WINDOW};
use serde::{Deserialize, Serialize};

/// Raw per-frame measurement from the landmark/pose extractor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMeasurement {
    /// Eye aspect ratio (0 = no valid reading)
    pub ear: f64,
    /// Mouth aspect ratio (0 = no valid reading)
    pub mar: f64,
    /// Head pitch in degrees (negative = down)
    #[serde(alias = "headPitch", alias = "head_pitch")]
    pub head_pitch_deg: f64,
    /// Head yaw in degrees
    #[serde(alias = "headYaw", alias = "head_yaw")]
    pub head_yaw_deg: f64,
}

impl RawMeasurement {
    pub fn new(ear: f64, mar: f64, head_pitch_deg: f64, head_yaw_deg: f64) -> Self {
        Self { ear, mar, head_pitch_deg, head_yaw_deg }
    }
}

/// Effective (smoothed) signal values for one frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SmoothedMeasurement {
    pub ear: f64,
    pub mar: f64,
    pub head_pitch_deg: f64,
    pub head_yaw_deg: f64,
}

/// Smoothed signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Ear,
    Mar,
    HeadPitch,
    HeadYaw,
}

impl Signal {
    /// Aspect ratios treat zero as "no reading"; angles admit every sample
    fn admits(&self, value: f64) -> bool {
        match self {
            Signal::Ear | Signal::Mar => value > 0.0,
            Signal::HeadPitch | Signal::HeadYaw => true,
        }
    }
}

/// Rolling signal cache: one moving-average window per signal
#[derive(Debug, Clone)]
pub struct SignalCache {
    ear: RollingWindow,
    mar: RollingWindow,
    pitch: RollingWindow,
    yaw: RollingWindow,
}

impl SignalCache {
    pub fn new(window: usize) -> Self {
        Self {
            ear: RollingWindow::new(window),
            mar: RollingWindow::new(window),
            pitch: RollingWindow::new(window),
            yaw: RollingWindow::new(window),
        }
    }

    fn window(&self, signal: Signal) -> &RollingWindow {
        match signal {
            Signal::Ear => &self.ear,
            Signal::Mar => &self.mar,
            Signal::HeadPitch => &self.pitch,
            Signal::HeadYaw => &self.yaw,
        }
    }

    fn window_mut(&mut self, signal: Signal) -> &mut RollingWindow {
        match signal {
            Signal::Ear => &mut self.ear,
            Signal::Mar => &mut self.mar,
            Signal::HeadPitch => &mut self.pitch,
            Signal::HeadYaw => &mut self.yaw,
        }
    }

    /// Append a sample, subject to the signal's admission filter
    pub fn update(&mut self, signal: Signal, value: f64) {
        if signal.admits(value) {
            self.window_mut(signal).push(value);
        }
    }

    /// Mean of the window, or the instantaneous value if it is still empty
    pub fn effective(&self, signal: Signal, instantaneous: f64) -> f64 {
        self.window(signal).mean_or(instantaneous)
    }

    /// Feed a full measurement and return the effective values
    pub fn smooth(&mut self, raw: &RawMeasurement) -> SmoothedMeasurement {
        self.update(Signal::Ear, raw.ear);
        self.update(Signal::Mar, raw.mar);
        self.update(Signal::HeadPitch, raw.head_pitch_deg);
        self.update(Signal::HeadYaw, raw.head_yaw_deg);

        SmoothedMeasurement {
            ear: self.effective(Signal::Ear, raw.ear),
            mar: self.effective(Signal::Mar, raw.mar),
            head_pitch_deg: self.effective(Signal::HeadPitch, raw.head_pitch_deg),
            head_yaw_deg: self.effective(Signal::HeadYaw, raw.head_yaw_deg),
        }
    }

    pub fn clear(&mut self) {
        self.ear.clear();
        self.mar.clear();
        self.pitch.clear();
        self.yaw.clear();
    }
}

impl Default for SignalCache {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
