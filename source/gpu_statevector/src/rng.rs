// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-shot random streams.
//!
//! Every shot owns a xoshiro128++ generator seeded from the run seed and its
//! global shot id, so a shot draws the same values whichever batch or device
//! runs it. The shader carries an identical copy of these functions.

#[cfg(test)]
mod tests;

/// Integer hash used to decorrelate neighboring shot ids before seeding.
#[must_use]
pub fn lane_hash(value: u32) -> u32 {
    let mut x = value;
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

/// Expand a 32-bit seed into a full xoshiro128++ state. The state is never all
/// zeros, since the hash of the four distinct inputs cannot all be zero.
#[must_use]
pub fn seed_state(seed: u32) -> [u32; 4] {
    let mut state = [0u32; 4];
    let mut z = seed;
    for word in &mut state {
        z = z.wrapping_add(0x9e37_79b9);
        *word = lane_hash(z);
    }
    if state == [0; 4] {
        state[0] = 1;
    }
    state
}

/// State for the shot with global id `shot_id` in a run seeded with `rng_seed`.
#[must_use]
pub fn shot_rng_state(rng_seed: u32, shot_id: u32) -> [u32; 4] {
    seed_state(rng_seed ^ lane_hash(shot_id))
}

/// Advance the generator and return the next 32 random bits.
pub fn next_u32(s: &mut [u32; 4]) -> u32 {
    let result = s[0].wrapping_add(s[3]).rotate_left(7).wrapping_add(s[0]);
    let t = s[1] << 9;

    s[2] ^= s[0];
    s[3] ^= s[1];
    s[1] ^= s[2];
    s[0] ^= s[3];

    s[2] ^= t;
    s[3] = s[3].rotate_left(11);

    result
}

/// Uniform float in `[0, 1)` built from the top 24 bits of the next output.
pub fn next_f32(s: &mut [u32; 4]) -> f32 {
    #[allow(clippy::cast_precision_loss)]
    let mantissa = (next_u32(s) >> 8) as f32;
    mantissa * (1.0 / 16_777_216.0)
}
