//! Touch pattern data types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Lowest pressure a generated sample may carry
pub const MIN_PRESSURE: f64 = 0.05;

/// Screen area a pattern must stay inside, in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenBounds {
    pub width: f64,
    pub height: f64,
}

impl ScreenBounds {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f64,
            height: height as f64,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }

    pub fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        (x.clamp(0.0, self.width), y.clamp(0.0, self.height))
    }

    pub fn shortest_side(&self) -> f64 {
        self.width.min(self.height)
    }
}

/// Gesture kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Tap,
    Swipe,
    LongPress,
    Pinch,
}

/// One timestamped, pressured sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub x: f64,
    pub y: f64,
    pub pressure: f64,
    /// Offset from the first sample of the gesture
    pub offset: Duration,
}

/// A complete synthesized gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchPattern {
    pub kind: GestureKind,
    pub points: Vec<TouchPoint>,
    pub total_duration: Duration,
    /// Second finger of a two-finger gesture
    pub companion: Option<Vec<TouchPoint>>,
}

impl TouchPattern {
    pub fn first(&self) -> Option<&TouchPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TouchPoint> {
        self.points.last()
    }

    /// Check the sample invariants against `bounds`
    pub fn validate(&self, bounds: &ScreenBounds) -> Result<()> {
        let traces = std::iter::once(&self.points).chain(self.companion.iter());
        for trace in traces {
            if trace.is_empty() {
                return Err(Error::internal("Touch pattern has no samples"));
            }
            for pair in trace.windows(2) {
                if pair[1].offset < pair[0].offset {
                    return Err(Error::internal("Touch sample offsets go backwards"));
                }
            }
            for p in trace {
                if !bounds.contains(p.x, p.y) {
                    return Err(Error::internal(format!(
                        "Touch sample ({:.1}, {:.1}) outside {}x{}",
                        p.x, p.y, bounds.width, bounds.height
                    )));
                }
                if !(p.pressure > 0.0 && p.pressure <= 1.0) {
                    return Err(Error::internal(format!("Pressure {} outside (0, 1]", p.pressure)));
                }
            }
        }
        Ok(())
    }
}

/// Gesture generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureProfile {
    /// Maximum distance of a tap from its target, in pixels
    pub accuracy_variance: f64,
    /// Standard deviation of per-sample jitter, in pixels
    pub tremor_amplitude: f64,
    /// Probability that a tap is held longer than usual
    pub hesitation_probability: f64,
    /// Upper bound of the hesitation duration multiplier
    pub hesitation_multiplier: f64,
    /// Swipe speed range in pixels per second
    pub speed_min: f64,
    pub speed_max: f64,
    /// Swipe duration bounds
    pub min_swipe_duration: Duration,
    pub max_swipe_duration: Duration,
    /// Perpendicular control point offset as a fraction of distance
    pub curvature: f64,
    /// Pixels travelled per path sample
    pub point_spacing: f64,
    /// Long-press sample rate in Hz
    pub long_press_rate_hz: f64,
    /// Slow drift while holding, in pixels
    pub drift_amplitude: f64,
    pub drift_frequency_hz: f64,
    /// Initial pinch finger separation as a fraction of the shortest side
    pub pinch_separation: f64,
}

impl Default for GestureProfile {
    fn default() -> Self {
        Self {
            accuracy_variance: 8.0,
            tremor_amplitude: 1.5,
            hesitation_probability: 0.08,
            hesitation_multiplier: 3.0,
            speed_min: 600.0,
            speed_max: 2400.0,
            min_swipe_duration: Duration::from_millis(200),
            max_swipe_duration: Duration::from_secs(3),
            curvature: 0.15,
            point_spacing: 20.0,
            long_press_rate_hz: 20.0,
            drift_amplitude: 2.0,
            drift_frequency_hz: 0.5,
            pinch_separation: 0.25,
        }
    }
}

impl GestureProfile {
    /// Faster, straighter gestures
    pub fn brisk() -> Self {
        Self {
            speed_min: 1200.0,
            speed_max: 3600.0,
            curvature: 0.08,
            hesitation_probability: 0.03,
            ..Self::default()
        }
    }

    /// Slower, looser gestures
    pub fn relaxed() -> Self {
        Self {
            accuracy_variance: 12.0,
            tremor_amplitude: 2.0,
            speed_min: 400.0,
            speed_max: 1500.0,
            curvature: 0.22,
            hesitation_probability: 0.12,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.accuracy_variance < 0.0 || self.tremor_amplitude < 0.0 || self.drift_amplitude < 0.0 {
            return Err(Error::configuration("Gesture amplitudes must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.hesitation_probability) {
            return Err(Error::configuration("hesitation_probability must be within [0, 1]"));
        }
        if self.hesitation_multiplier < 1.0 {
            return Err(Error::configuration("hesitation_multiplier must be at least 1"));
        }
        if self.speed_min <= 0.0 || self.speed_min > self.speed_max {
            return Err(Error::configuration("Invalid swipe speed range"));
        }
        if self.min_swipe_duration.is_zero() || self.min_swipe_duration > self.max_swipe_duration {
            return Err(Error::configuration("Invalid swipe duration bounds"));
        }
        if self.point_spacing <= 0.0 {
            return Err(Error::configuration("point_spacing must be positive"));
        }
        if self.long_press_rate_hz < 10.0 {
            return Err(Error::configuration("long_press_rate_hz must be at least 10"));
        }
        if !(0.0..1.0).contains(&self.pinch_separation) || self.pinch_separation == 0.0 {
            return Err(Error::configuration("pinch_separation must be within (0, 1)"));
        }
        Ok(())
    }
}
