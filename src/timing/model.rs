//! Inter-action delay generation
//!
//! Delays are log-normal draws shaped by the profile's tier and personality,
//! then scaled by fatigue, time of day and the occasional distraction, and
//! finally clamped to the tier band. The consistency score is computed from
//! the produced delays but never feeds back into them.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Timelike;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::profile::BehaviorProfile;
use crate::sampling::log_normal;

/// Timing model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Median delay before tier and personality scaling
    pub base_delay: Duration,
    /// Fatigue added per prior action
    pub fatigue_per_action: f64,
    /// Upper bound of the fatigue multiplier
    pub fatigue_cap: f64,
    /// Half-open `[start, end)` local hours of low energy
    pub low_energy_hours: Vec<(u32, u32)>,
    pub low_energy_factor: f64,
    pub distraction_probability: f64,
    pub distraction_range: (f64, f64),
    /// Coefficient-of-variation band scored as fully consistent
    pub consistency_band: (f64, f64),
    /// Number of recent delays kept for the consistency score
    pub window: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1200),
            fatigue_per_action: 0.004,
            fatigue_cap: 1.5,
            low_energy_hours: vec![(0, 6), (13, 15)],
            low_energy_factor: 1.3,
            distraction_probability: 0.05,
            distraction_range: (2.0, 5.0),
            consistency_band: (0.15, 0.40),
            window: 20,
        }
    }
}

/// Per-run mutable state
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunningState {
    action_count: u64,
    recent: VecDeque<f64>,
}

impl RunningState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action_count(&self) -> u64 {
        self.action_count
    }

    pub fn recent_delays(&self) -> impl Iterator<Item = Duration> + '_ {
        self.recent.iter().map(|s| Duration::from_secs_f64(*s))
    }

    fn record(&mut self, delay: Duration, window: usize) {
        self.action_count += 1;
        self.recent.push_back(delay.as_secs_f64());
        while self.recent.len() > window.max(2) {
            self.recent.pop_front();
        }
    }

    /// Coefficient of variation of the recent delays
    pub fn coefficient_of_variation(&self) -> Option<f64> {
        if self.recent.len() < 2 {
            return None;
        }
        let n = self.recent.len() as f64;
        let mean = self.recent.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return None;
        }
        let variance = self.recent.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        Some(variance.sqrt() / mean)
    }

    /// 1.0 inside `band`, decaying linearly outside; `None` until two delays exist
    pub fn consistency_score(&self, band: (f64, f64)) -> Option<f64> {
        let cv = self.coefficient_of_variation()?;
        let (low, high) = band;
        let score = if cv < low {
            cv / low
        } else if cv > high {
            1.0 - (cv - high) / high
        } else {
            1.0
        };
        Some(score.clamp(0.0, 1.0))
    }
}

/// One delay and the factors that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelaySample {
    pub delay: Duration,
    pub base: Duration,
    pub fatigue: f64,
    pub time_of_day: f64,
    pub distraction: Option<f64>,
}

/// Behavior timing model
#[derive(Debug, Clone, Default)]
pub struct BehaviorTimingModel {
    config: TimingConfig,
}

impl BehaviorTimingModel {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Next pre-action delay using the local wall-clock hour
    pub fn next_delay<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        profile: &BehaviorProfile,
        state: &mut RunningState,
    ) -> Duration {
        let hour = chrono::Local::now().hour();
        self.sample_at(rng, profile, state, hour).delay
    }

    /// Next pre-action delay for an explicit hour of day
    pub fn next_delay_at<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        profile: &BehaviorProfile,
        state: &mut RunningState,
        hour: u32,
    ) -> Duration {
        self.sample_at(rng, profile, state, hour).delay
    }

    /// Draw a delay, record it in `state` and report its factors
    pub fn sample_at<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        profile: &BehaviorProfile,
        state: &mut RunningState,
        hour: u32,
    ) -> DelaySample {
        let tier = profile.tier();
        let personality = profile.personality();
        let (min, max) = tier.band();

        let median = self.config.base_delay.as_secs_f64() * tier.scale() * personality.pace_factor();
        let base = log_normal(rng, median, tier.sigma() * personality.spread_factor());

        let fatigue = self.fatigue_factor(state.action_count);
        let time_of_day = self.time_of_day_factor(hour);
        let distraction = if rng.gen_bool(self.config.distraction_probability.clamp(0.0, 1.0)) {
            let (low, high) = self.config.distraction_range;
            Some(rng.gen_range(low..=high))
        } else {
            None
        };

        let raw = base * fatigue * time_of_day * distraction.unwrap_or(1.0);
        let delay = if raw.is_finite() && raw > 0.0 {
            Duration::from_secs_f64(raw.min(max.as_secs_f64() * 2.0)).clamp(min, max)
        } else {
            min
        };

        state.record(delay, self.config.window);

        DelaySample {
            delay,
            base: Duration::from_secs_f64(base.clamp(0.0, 3600.0)),
            fatigue,
            time_of_day,
            distraction,
        }
    }

    /// Grows slowly with prior actions, capped
    pub fn fatigue_factor(&self, actions: u64) -> f64 {
        (1.0 + actions as f64 * self.config.fatigue_per_action).min(self.config.fatigue_cap)
    }

    /// Slower inside the configured low-energy windows
    pub fn time_of_day_factor(&self, hour: u32) -> f64 {
        let hour = hour % 24;
        let low = self
            .config
            .low_energy_hours
            .iter()
            .any(|(start, end)| hour >= *start && hour < *end);
        if low {
            self.config.low_energy_factor
        } else {
            1.0
        }
    }

    /// Consistency score of `state` against the configured band
    pub fn consistency_score(&self, state: &RunningState) -> Option<f64> {
        state.consistency_score(self.config.consistency_band)
    }

    /// Whether the run's consistency reaches the profile's target
    pub fn meets_target(&self, profile: &BehaviorProfile, state: &RunningState) -> bool {
        self.consistency_score(state)
            .map(|score| score >= profile.consistency_target())
            .unwrap_or(false)
    }
}
