// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{lane_hash, next_f32, next_u32, seed_state, shot_rng_state};

#[test]
fn same_seed_and_shot_repeat_the_stream() {
    let mut a = shot_rng_state(42, 7);
    let mut b = shot_rng_state(42, 7);
    for _ in 0..100 {
        assert_eq!(next_u32(&mut a), next_u32(&mut b));
    }
}

#[test]
fn neighboring_shots_get_different_streams() {
    let mut a = shot_rng_state(42, 7);
    let mut b = shot_rng_state(42, 8);
    let first: Vec<u32> = (0..8).map(|_| next_u32(&mut a)).collect();
    let second: Vec<u32> = (0..8).map(|_| next_u32(&mut b)).collect();
    assert_ne!(first, second);
}

#[test]
fn different_seeds_get_different_streams() {
    assert_ne!(shot_rng_state(1, 0), shot_rng_state(2, 0));
}

#[test]
fn seeded_state_is_never_all_zero() {
    for seed in [0, 1, u32::MAX, lane_hash(0)] {
        assert_ne!(seed_state(seed), [0; 4]);
    }
}

#[test]
fn floats_are_in_unit_interval_with_plausible_mean() {
    let mut state = shot_rng_state(1234, 0);
    let count = 10_000;
    let mut sum = 0.0f64;
    for _ in 0..count {
        let value = next_f32(&mut state);
        assert!((0.0..1.0).contains(&value));
        sum += f64::from(value);
    }
    let mean = sum / f64::from(count);
    assert!((mean - 0.5).abs() < 0.02, "mean was {mean}");
}

#[test]
fn xoshiro_reference_values() {
    // Reference outputs for state [1, 2, 3, 4]
    let mut state = [1, 2, 3, 4];
    assert_eq!(next_u32(&mut state), 641);
    assert_eq!(next_u32(&mut state), 1_573_767);
}
