//! Touch pattern synthesizer
//!
//! Generates human-like touch traces. All randomness comes from the owned
//! random source, so a seeded synthesizer reproduces its output exactly.

use std::f64::consts::PI;
use std::time::Duration;

use bezier_rs::{Bezier, TValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::*;
use crate::sampling::{bounded_gaussian, gaussian};

/// Minimum number of samples in a tap
pub const TAP_MIN_POINTS: usize = 3;
/// Maximum number of samples in a tap
pub const TAP_MAX_POINTS: usize = 7;
/// Tap contact time range before hesitation, in milliseconds
pub const TAP_DURATION_MS: (f64, f64) = (80.0, 150.0);
/// Minimum number of samples on a swipe path
pub const MIN_PATH_POINTS: usize = 10;
/// Upper bound on path samples regardless of distance
pub const MAX_PATH_POINTS: usize = 240;
/// Shortest long-press or pinch accepted
pub const MIN_HOLD_DURATION: Duration = Duration::from_millis(100);
/// Longest long-press or pinch accepted
pub const MAX_HOLD_DURATION: Duration = Duration::from_secs(60);
/// Upper bound on long-press samples, 10 Hz over the longest hold still fits
pub const MAX_HOLD_POINTS: usize = 1201;
/// Closest the two pinch fingers get, in pixels
const MIN_FINGER_SEPARATION: f64 = 20.0;

/// Touch pattern synthesizer
#[derive(Debug)]
pub struct TouchSynthesizer<R: Rng = StdRng> {
    rng: R,
}

impl TouchSynthesizer<StdRng> {
    /// Deterministic synthesizer
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Synthesizer seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl<R: Rng> TouchSynthesizer<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Single tap near `(x, y)`
    pub fn tap(&mut self, x: f64, y: f64, bounds: &ScreenBounds, profile: &GestureProfile) -> TouchPattern {
        let count = self.rng.gen_range(TAP_MIN_POINTS..=TAP_MAX_POINTS);
        let mut duration_ms = self.rng.gen_range(TAP_DURATION_MS.0..=TAP_DURATION_MS.1);
        if self.rng.gen_bool(profile.hesitation_probability) {
            duration_ms *= self.rng.gen_range(1.0..=profile.hesitation_multiplier);
        }
        let duration = Duration::from_micros((duration_ms * 1000.0).round() as u64);

        let (tx, ty) = sanitize(bounds, x, y);
        let angle = self.rng.gen_range(0.0..2.0 * PI);
        let radius = bounded_gaussian(&mut self.rng, profile.accuracy_variance / 2.0, profile.accuracy_variance).abs();
        let (cx, cy) = bounds.clamp(tx + radius * angle.cos(), ty + radius * angle.sin());

        let peak = self.rng.gen_range(0.45..=0.85);
        let points = (0..count)
            .map(|i| {
                let t = i as f64 / (count - 1) as f64;
                let jx = bounded_gaussian(&mut self.rng, profile.tremor_amplitude, profile.tremor_amplitude * 2.0);
                let jy = bounded_gaussian(&mut self.rng, profile.tremor_amplitude, profile.tremor_amplitude * 2.0);
                let noise = gaussian(&mut self.rng, 0.0, 0.03);
                let (px, py) = bounds.clamp(cx + jx, cy + jy);
                TouchPoint {
                    x: px,
                    y: py,
                    pressure: clamp_pressure(triphasic(t, peak, 0.25, 0.25) + hold_noise(t, 0.25, 0.25, noise)),
                    offset: offset_at(duration, i, count),
                }
            })
            .collect();

        TouchPattern {
            kind: GestureKind::Tap,
            points,
            total_duration: duration,
            companion: None,
        }
    }

    /// Swipe from `(x1, y1)` to `(x2, y2)`; duration is derived from distance when absent
    pub fn swipe(
        &mut self,
        from: (f64, f64),
        to: (f64, f64),
        duration: Option<Duration>,
        bounds: &ScreenBounds,
        profile: &GestureProfile,
    ) -> TouchPattern {
        // Drawn before anything distance dependent so equal seeds share a speed.
        let speed = self.rng.gen_range(profile.speed_min..=profile.speed_max);

        let start = sanitize(bounds, from.0, from.1);
        let end = sanitize(bounds, to.0, to.1);
        let distance = (end.0 - start.0).hypot(end.1 - start.1);

        let (min, max) = (profile.min_swipe_duration, profile.max_swipe_duration);
        let total = match duration {
            Some(requested) => requested.clamp(min, max),
            None => {
                let seconds = distance / speed;
                if seconds <= min.as_secs_f64() {
                    min
                } else if seconds >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(seconds)
                }
            }
        };

        let count = path_point_count(distance, profile.point_spacing);
        let points = self.build_path(start, end, count, total, bounds, profile);

        TouchPattern {
            kind: GestureKind::Swipe,
            points,
            total_duration: total,
            companion: None,
        }
    }

    /// Press and hold at `(x, y)`
    pub fn long_press(
        &mut self,
        x: f64,
        y: f64,
        duration: Duration,
        bounds: &ScreenBounds,
        profile: &GestureProfile,
    ) -> TouchPattern {
        let duration = duration.clamp(MIN_HOLD_DURATION, MAX_HOLD_DURATION);
        let seconds = duration.as_secs_f64();
        let rate = profile.long_press_rate_hz.max(10.0);
        let count = ((seconds * rate).ceil() as usize + 1).clamp(2, MAX_HOLD_POINTS);

        let (tx, ty) = sanitize(bounds, x, y);
        let angle = self.rng.gen_range(0.0..2.0 * PI);
        let radius = bounded_gaussian(&mut self.rng, profile.accuracy_variance / 2.0, profile.accuracy_variance).abs();
        let (cx, cy) = (tx + radius * angle.cos(), ty + radius * angle.sin());

        let phase = self.rng.gen_range(0.0..2.0 * PI);
        let frequency = profile.drift_frequency_hz * self.rng.gen_range(0.6..=1.4);
        let peak = self.rng.gen_range(0.5..=0.9);

        let points = (0..count)
            .map(|i| {
                let t = i as f64 / (count - 1) as f64;
                let elapsed = seconds * t;
                let wave = 2.0 * PI * frequency * elapsed + phase;
                let micro = profile.tremor_amplitude * 0.5;
                let dx = profile.drift_amplitude * wave.sin() + bounded_gaussian(&mut self.rng, micro, micro * 3.0);
                let dy = profile.drift_amplitude * 0.6 * wave.cos() + bounded_gaussian(&mut self.rng, micro, micro * 3.0);
                let (px, py) = bounds.clamp(cx + dx, cy + dy);
                let sway = 0.04 * (wave * 0.5).sin();
                TouchPoint {
                    x: px,
                    y: py,
                    pressure: clamp_pressure(triphasic(t, peak, 0.1, 0.1) + hold_noise(t, 0.1, 0.1, sway)),
                    offset: offset_at(duration, i, count),
                }
            })
            .collect();

        TouchPattern {
            kind: GestureKind::LongPress,
            points,
            total_duration: duration,
            companion: None,
        }
    }

    /// Two-finger pinch centred on `(cx, cy)`; `scale > 1` spreads, `scale < 1` pinches in
    pub fn pinch(
        &mut self,
        cx: f64,
        cy: f64,
        scale: f64,
        duration: Duration,
        bounds: &ScreenBounds,
        profile: &GestureProfile,
    ) -> TouchPattern {
        let duration = duration.clamp(MIN_HOLD_DURATION, MAX_HOLD_DURATION);
        let scale = if scale.is_finite() { scale.clamp(0.1, 10.0) } else { 1.0 };
        let (cx, cy) = sanitize(bounds, cx, cy);

        let orientation = self.rng.gen_range(0.0..PI);
        let (ux, uy) = (orientation.cos(), orientation.sin());
        let diagonal = bounds.width.hypot(bounds.height);
        let initial = (bounds.shortest_side() * profile.pinch_separation).max(MIN_FINGER_SEPARATION);
        let target = (initial * scale).clamp(MIN_FINGER_SEPARATION, diagonal.max(MIN_FINGER_SEPARATION));

        let finger = |sign: f64, separation: f64| {
            bounds.clamp(cx + sign * ux * separation / 2.0, cy + sign * uy * separation / 2.0)
        };

        let travel = (target - initial).abs() / 2.0;
        let count = path_point_count(travel, profile.point_spacing);
        let primary = self.build_path(finger(1.0, initial), finger(1.0, target), count, duration, bounds, profile);
        let secondary = self.build_path(finger(-1.0, initial), finger(-1.0, target), count, duration, bounds, profile);

        let points = primary
            .iter()
            .zip(&secondary)
            .map(|(a, b)| TouchPoint {
                pressure: clamp_pressure((a.pressure + b.pressure) / 2.0),
                ..*a
            })
            .collect();

        TouchPattern {
            kind: GestureKind::Pinch,
            points,
            total_duration: duration,
            companion: Some(secondary),
        }
    }

    /// Curved path between two points on a uniform time grid of `count` samples
    fn build_path(
        &mut self,
        start: (f64, f64),
        end: (f64, f64),
        count: usize,
        duration: Duration,
        bounds: &ScreenBounds,
        profile: &GestureProfile,
    ) -> Vec<TouchPoint> {
        let (dx, dy) = (end.0 - start.0, end.1 - start.1);
        let distance = dx.hypot(dy);
        let (nx, ny) = if distance > f64::EPSILON {
            (-dy / distance, dx / distance)
        } else {
            (0.0, 0.0)
        };

        let bend = self.rng.gen_range(-1.0..=1.0) * profile.curvature * distance;
        let control = (
            (start.0 + end.0) / 2.0 + nx * bend,
            (start.1 + end.1) / 2.0 + ny * bend,
        );
        let curve = Bezier::from_quadratic_coordinates(start.0, start.1, control.0, control.1, end.0, end.1);

        let peak = self.rng.gen_range(0.4..=0.75);
        let jitter = profile.tremor_amplitude * 0.5;

        (0..count)
            .map(|i| {
                let u = i as f64 / (count - 1) as f64;
                let point = curve.evaluate(TValue::Parametric(eased_progress(u)));
                let jx = bounded_gaussian(&mut self.rng, jitter, jitter * 3.0);
                let jy = bounded_gaussian(&mut self.rng, jitter, jitter * 3.0);
                let noise = gaussian(&mut self.rng, 0.0, 0.025);
                let (px, py) = bounds.clamp(point.x + jx, point.y + jy);
                TouchPoint {
                    x: px,
                    y: py,
                    pressure: clamp_pressure(triphasic(u, peak, 0.15, 0.15) + hold_noise(u, 0.15, 0.15, noise)),
                    offset: offset_at(duration, i, count),
                }
            })
            .collect()
    }
}

fn sanitize(bounds: &ScreenBounds, x: f64, y: f64) -> (f64, f64) {
    let x = if x.is_finite() { x } else { 0.0 };
    let y = if y.is_finite() { y } else { 0.0 };
    bounds.clamp(x, y)
}

/// Exact integer split of `duration` so the last sample lands on it
fn offset_at(duration: Duration, index: usize, count: usize) -> Duration {
    let nanos = duration.as_nanos() * index as u128 / (count - 1) as u128;
    Duration::new((nanos / 1_000_000_000) as u64, (nanos % 1_000_000_000) as u32)
}

fn path_point_count(distance: f64, spacing: f64) -> usize {
    ((distance / spacing).ceil() as usize).clamp(MIN_PATH_POINTS, MAX_PATH_POINTS)
}

/// Fraction of the path covered at time fraction `u`.
///
/// Velocity ramps up linearly over the first 30%, holds until 70% and ramps
/// down to zero; this is its normalised integral.
pub fn eased_progress(u: f64) -> f64 {
    const AREA: f64 = 0.7;
    let u = u.clamp(0.0, 1.0);
    let covered = if u < 0.3 {
        u * u / 0.6
    } else if u < 0.7 {
        0.15 + (u - 0.3)
    } else {
        let tail = u - 0.7;
        0.55 + tail - tail * tail / 0.6
    };
    (covered / AREA).clamp(0.0, 1.0)
}

/// Ramp-up, hold, ramp-down pressure envelope
fn triphasic(t: f64, peak: f64, rise: f64, fall: f64) -> f64 {
    if t < rise {
        peak * (0.3 + 0.7 * t / rise)
    } else if t > 1.0 - fall {
        peak * (0.3 + 0.7 * (1.0 - t) / fall)
    } else {
        peak
    }
}

/// Noise applies during the hold phase only
fn hold_noise(t: f64, rise: f64, fall: f64, noise: f64) -> f64 {
    if t >= rise && t <= 1.0 - fall {
        noise
    } else {
        0.0
    }
}

fn clamp_pressure(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(MIN_PRESSURE, 1.0)
    } else {
        MIN_PRESSURE
    }
}
