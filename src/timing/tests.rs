//! Behavior timing model tests

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;

fn profile(personality: Personality, aggressiveness: f64) -> BehaviorProfile {
    BehaviorProfile::new(personality, aggressiveness, 0.6).unwrap()
}

#[test]
fn test_tier_boundaries() {
    assert_eq!(AggressivenessTier::from_aggressiveness(0.0), AggressivenessTier::Cautious);
    assert_eq!(AggressivenessTier::from_aggressiveness(0.249), AggressivenessTier::Cautious);
    assert_eq!(AggressivenessTier::from_aggressiveness(0.25), AggressivenessTier::Moderate);
    assert_eq!(AggressivenessTier::from_aggressiveness(0.5), AggressivenessTier::Brisk);
    assert_eq!(AggressivenessTier::from_aggressiveness(0.75), AggressivenessTier::Aggressive);
    assert_eq!(AggressivenessTier::from_aggressiveness(1.0), AggressivenessTier::Aggressive);
}

#[test]
fn test_profile_rejects_out_of_range() {
    assert!(BehaviorProfile::new(Personality::Casual, 1.2, 0.5).is_err());
    assert!(BehaviorProfile::new(Personality::Casual, 0.5, -0.1).is_err());
    assert!(BehaviorProfile::new(Personality::Casual, f64::NAN, 0.5).is_err());
}

#[test]
fn test_deserialized_profile_is_validated() {
    let ok: BehaviorProfile =
        serde_json::from_str(r#"{"personality":"focused","aggressiveness":0.8,"consistency_target":0.5}"#).unwrap();
    assert_eq!(ok.tier(), AggressivenessTier::Aggressive);

    let out_of_range = serde_json::from_str::<BehaviorProfile>(
        r#"{"personality":"casual","aggressiveness":3.0,"consistency_target":0.5}"#,
    );
    assert!(out_of_range.is_err());

    let round_trip: BehaviorProfile = serde_json::from_str(&serde_json::to_string(&ok).unwrap()).unwrap();
    assert_eq!(round_trip, ok);
}

#[test]
fn test_delay_within_band_for_every_tier() {
    let model = BehaviorTimingModel::default();
    let mut rng = StdRng::seed_from_u64(2024);

    for (personality, aggressiveness) in [
        (Personality::Deliberate, 0.1),
        (Personality::Casual, 0.3),
        (Personality::Focused, 0.6),
        (Personality::Impulsive, 0.9),
    ] {
        let profile = profile(personality, aggressiveness);
        let (min, max) = profile.tier().band();
        let mut state = RunningState::new();

        for trial in 0..10_000u32 {
            let delay = model.next_delay_at(&mut rng, &profile, &mut state, trial % 24);
            assert!(delay >= min && delay <= max, "{:?} outside {:?}..{:?}", delay, min, max);
        }
        assert_eq!(state.action_count(), 10_000);
    }
}

#[test]
fn test_wall_clock_delay_within_band() {
    let model = BehaviorTimingModel::default();
    let mut rng = StdRng::seed_from_u64(5);
    let profile = profile(Personality::Focused, 0.8);
    let (min, max) = profile.tier().band();
    let mut state = RunningState::new();

    for _ in 0..1_000 {
        let delay = model.next_delay(&mut rng, &profile, &mut state);
        assert!(delay >= min && delay <= max);
    }
}

#[test]
fn test_more_aggressive_is_faster_on_average() {
    let model = BehaviorTimingModel::default();
    let mut rng = StdRng::seed_from_u64(77);

    let mean = |rng: &mut StdRng, p: BehaviorProfile| {
        let mut state = RunningState::new();
        let total: Duration = (0..2_000).map(|_| model.next_delay_at(rng, &p, &mut state, 10)).sum();
        total / 2_000
    };

    let cautious = mean(&mut rng, profile(Personality::Casual, 0.1));
    let aggressive = mean(&mut rng, profile(Personality::Casual, 0.9));
    assert!(aggressive < cautious);
}

#[test]
fn test_fatigue_grows_and_caps() {
    let model = BehaviorTimingModel::default();
    assert_eq!(model.fatigue_factor(0), 1.0);
    assert!(model.fatigue_factor(50) > model.fatigue_factor(10));
    assert_eq!(model.fatigue_factor(10_000), 1.5);
}

#[test]
fn test_time_of_day_windows() {
    let model = BehaviorTimingModel::default();
    assert_eq!(model.time_of_day_factor(3), 1.3);
    assert_eq!(model.time_of_day_factor(14), 1.3);
    assert_eq!(model.time_of_day_factor(15), 1.0);
    assert_eq!(model.time_of_day_factor(10), 1.0);
    assert_eq!(model.time_of_day_factor(27), 1.3);
}

#[test]
fn test_distraction_rate_near_five_percent() {
    let model = BehaviorTimingModel::default();
    let mut rng = StdRng::seed_from_u64(8);
    let profile = profile(Personality::Casual, 0.4);
    let mut state = RunningState::new();

    let trials = 20_000;
    let distracted = (0..trials)
        .map(|_| model.sample_at(&mut rng, &profile, &mut state, 10))
        .filter(|s| {
            if let Some(factor) = s.distraction {
                assert!((2.0..=5.0).contains(&factor));
                true
            } else {
                false
            }
        })
        .count();

    let rate = distracted as f64 / trials as f64;
    assert!((0.035..=0.065).contains(&rate), "distraction rate {}", rate);
}

#[test]
fn test_deterministic_with_seed() {
    let model = BehaviorTimingModel::default();
    let profile = profile(Personality::Impulsive, 0.55);

    let run = || {
        let mut rng = StdRng::seed_from_u64(31337);
        let mut state = RunningState::new();
        (0..50).map(|_| model.next_delay_at(&mut rng, &profile, &mut state, 9)).collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_consistency_score_band() {
    let model = BehaviorTimingModel::default();
    let mut state = RunningState::new();
    assert_eq!(model.consistency_score(&state), None);

    // Fatigue, time of day and distraction disabled.
    let mut rng = StdRng::seed_from_u64(1);
    let rigid = BehaviorTimingModel::new(TimingConfig {
        distraction_probability: 0.0,
        fatigue_per_action: 0.0,
        low_energy_hours: vec![],
        ..TimingConfig::default()
    });
    for _ in 0..30 {
        rigid.next_delay_at(&mut rng, &profile(Personality::Focused, 0.6), &mut state, 10);
    }
    let score = model.consistency_score(&state).unwrap();
    assert!((0.0..=1.0).contains(&score));
    assert_eq!(state.recent_delays().count(), 20);
}

#[test]
fn test_consistency_score_mapping() {
    let mut state = RunningState::default();
    let model = BehaviorTimingModel::default();
    let mut rng = StdRng::seed_from_u64(4);
    let profile = profile(Personality::Casual, 0.3);
    for _ in 0..20 {
        model.next_delay_at(&mut rng, &profile, &mut state, 10);
    }

    let cv = state.coefficient_of_variation().unwrap();
    let score = state.consistency_score((0.15, 0.40)).unwrap();
    if (0.15..=0.40).contains(&cv) {
        assert_eq!(score, 1.0);
    } else {
        assert!(score < 1.0);
    }

    // A band that always contains the measured cv scores perfectly.
    assert_eq!(state.consistency_score((0.0, f64::MAX)), Some(1.0));
    assert!(state.consistency_score((cv * 2.0, cv * 4.0)).unwrap() < 1.0);
    let _ = model.meets_target(&profile, &state);
}
