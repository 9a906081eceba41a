// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use num_complex::Complex32;

use crate::shader_types::{ALL_QUBITS, NoiseParams, Op, QubitState, ShotData, ops};

/// A qubit is due for idle noise once its idle time reaches the threshold.
#[must_use]
pub fn is_due(qubit: &QubitState, noise: &NoiseParams) -> bool {
    noise.idle_noise_enabled != 0 && qubit.idle_time > 0.0 && qubit.idle_time >= noise.due_threshold
}

/// Kraus branch for `idle_time` of amplitude damping followed by pure dephasing,
/// scaled so the selected branch keeps the state normalized. `p1` is the
/// probability the qubit is in |1⟩. Returned row-major as a 2x2 matrix.
#[must_use]
pub fn decay_operator(
    idle_time: f32,
    p1: f32,
    noise: &NoiseParams,
    rand_damping: f32,
    rand_dephase: f32,
) -> [Complex32; 4] {
    let zero = Complex32::new(0.0, 0.0);
    let gamma = 1.0 - (-idle_time / noise.t1).exp();
    let p_jump = gamma * p1;

    let mut k = if rand_damping < p_jump {
        // |1⟩ decayed to |0⟩
        [zero, Complex32::new(1.0 / p1.sqrt(), 0.0), zero, zero]
    } else {
        let norm = 1.0 / (1.0 - p_jump).sqrt();
        [
            Complex32::new(norm, 0.0),
            zero,
            zero,
            Complex32::new((1.0 - gamma).sqrt() * norm, 0.0),
        ]
    };

    let dephasing_rate = 1.0 / noise.t2 - 0.5 / noise.t1;
    if dephasing_rate > 0.0 {
        let p_z = (1.0 - (-idle_time * dephasing_rate).exp()) / 2.0;
        if rand_dephase < p_z {
            k[2] = -k[2];
            k[3] = -k[3];
        }
    }
    k
}

fn qubit_mask(op: &Op) -> u32 {
    op.qubits().iter().fold(0, |mask, q| mask | (1 << q))
}

/// Advance the shot's clock for `op`.
///
/// Outside a parallel region the op's qubits accrue busy time and every other
/// qubit accrues idle time. Inside a region the time is deferred: the region
/// tracks the qubits it touched and its longest op, and charges both when it ends.
pub fn accrue_duration(shot: &mut ShotData, op: &Op, noise: &NoiseParams, qubit_count: u32) {
    match op.id {
        ops::PARALLEL_START => {
            if shot.region_active == 0 {
                shot.region_active = 1;
                shot.region_qubits = 0;
                shot.region_duration = 0.0;
            }
        }
        ops::PARALLEL_END => {
            if shot.region_active != 0 {
                let duration = shot.region_duration;
                charge(shot, shot.region_qubits, duration, qubit_count);
                shot.region_active = 0;
                shot.region_qubits = 0;
                shot.region_duration = 0.0;
            }
        }
        _ => {
            // Reset-all addresses no real qubit
            let mask = if op.id == ops::RESET && op.q1 == ALL_QUBITS {
                0
            } else {
                qubit_mask(op)
            };
            let duration = noise.duration(op.id);
            if shot.region_active != 0 {
                shot.region_qubits |= mask;
                shot.region_duration = shot.region_duration.max(duration);
            } else {
                charge(shot, mask, duration, qubit_count);
            }
        }
    }
}

fn charge(shot: &mut ShotData, busy: u32, duration: f32, qubit_count: u32) {
    if duration <= 0.0 {
        return;
    }
    for (q, state) in shot.qubits.iter_mut().take(qubit_count as usize).enumerate() {
        if busy & (1 << q) != 0 {
            state.heat += duration;
        } else {
            state.idle_time += duration;
        }
    }
    shot.elapsed += duration;
}
