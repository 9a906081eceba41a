// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU32, Ordering};

use num_complex::Complex32;

use super::noise::{accrue_duration, decay_operator, is_due};
use super::{KernelContext, rotation_1q};
use crate::rng::{next_f32, shot_rng_state};
use crate::shader_types::{
    ALL_QUBITS, OP_MATRIX_CAPACITY, Op, OpID, QubitState, RENORM_TOLERANCE, RESULT_LOST, ShotData,
    WorkgroupSums, ops, status,
};

const ZERO: Complex32 = Complex32::new(0.0, 0.0);
const ONE: Complex32 = Complex32::new(1.0, 0.0);

/// Prepare shot `shot_idx` of the batch for the next step of the program.
///
/// `sums` is the collation the shot's workgroups wrote during the previous
/// Execute, `cursor` is the shot's results cursor, and `measurements` is the
/// shot's slice of the measurement results buffer.
pub fn prepare_op(
    ctx: &KernelContext,
    shot_idx: u32,
    shot: &mut ShotData,
    sums: &[WorkgroupSums],
    cursor: &AtomicU32,
    measurements: &mut [u32],
) {
    let op_idx = shot.next_op_idx;
    let Some(op) = ctx.ops.get(op_idx as usize) else {
        // Past the end of the program: nothing left to do but keep the state as is
        shot.op_type = ops::ID;
        shot.renormalize = 1.0;
        return;
    };

    if op.id == ops::RESET && op.q1 == ALL_QUBITS {
        reset_shot(ctx, shot_idx, shot, cursor, measurements);
    } else {
        draw_random_values(shot);
        fold_collation(shot, sums, ctx.uniforms.qubit_count);
        shot.op_type = ops::ID;
        shot.injected_arity = 0;
        if shot.status == status::OK {
            resolve_op(ctx, shot, op, op_idx, measurements);
        }
    }

    shot.collect_probabilities = u32::from(needs_probabilities(ctx, op_idx as usize + 1));
    shot.op_idx = op_idx;
    shot.next_op_idx = op_idx + 1;
}

fn reset_shot(
    ctx: &KernelContext,
    shot_idx: u32,
    shot: &mut ShotData,
    cursor: &AtomicU32,
    measurements: &mut [u32],
) {
    let next_op_idx = shot.next_op_idx;
    *shot = ShotData::default();
    shot.shot_id = ctx.uniforms.batch_start_shot_id + shot_idx;
    shot.next_op_idx = next_op_idx;
    shot.rng_state = shot_rng_state(ctx.uniforms.rng_seed, shot.shot_id);
    shot.renormalize = 1.0;
    shot.status = status::OK;
    shot.op_type = ops::RESET;
    for qubit in shot.qubits.iter_mut().take(ctx.uniforms.qubit_count as usize) {
        qubit.zero_probability = 1.0;
    }
    measurements.fill(0);
    cursor.store(0, Ordering::Relaxed);
}

fn draw_random_values(shot: &mut ShotData) {
    // Always draw all five so a shot's stream does not depend on which branch it took
    shot.rand_pauli = next_f32(&mut shot.rng_state);
    shot.rand_damping = next_f32(&mut shot.rng_state);
    shot.rand_dephase = next_f32(&mut shot.rng_state);
    shot.rand_measure = next_f32(&mut shot.rng_state);
    shot.rand_loss = next_f32(&mut shot.rng_state);
}

fn fold_collation(shot: &mut ShotData, sums: &[WorkgroupSums], qubit_count: u32) {
    let total: f32 = sums.iter().map(|wg| wg.total).sum();
    shot.renormalize = if total > 0.0 && (total - 1.0).abs() > RENORM_TOLERANCE {
        1.0 / total.sqrt()
    } else {
        1.0
    };

    if shot.collect_probabilities != 0 {
        for (q, qubit) in shot
            .qubits
            .iter_mut()
            .take(qubit_count as usize)
            .enumerate()
        {
            let one: f32 = sums.iter().map(|wg| wg.one_probabilities[q]).sum();
            qubit.one_probability = one;
            qubit.zero_probability = (total - one).max(0.0);
        }
    }
}

fn needs_probabilities(ctx: &KernelContext, next_idx: usize) -> bool {
    if ctx.noise.idle_noise_enabled != 0 {
        return true;
    }
    ctx.ops.get(next_idx).is_some_and(|next| match next.id {
        ops::MZ | ops::MRESETZ | ops::LOSS_NOISE => true,
        ops::RESET => next.q1 != ALL_QUBITS,
        _ => false,
    })
}

fn fail(shot: &mut ShotData, code: u32, op_idx: u32) {
    shot.status = code;
    shot.status_op_idx = op_idx;
    shot.op_type = ops::ID;
}

fn validate_qubits(op: &Op, qubit_count: u32) -> bool {
    let qubits = op.qubits();
    qubits.iter().enumerate().all(|(i, q)| {
        *q < qubit_count && !qubits[..i].contains(q)
    })
}

fn resolve_op(
    ctx: &KernelContext,
    shot: &mut ShotData,
    op: &Op,
    op_idx: u32,
    measurements: &mut [u32],
) {
    let qubit_count = ctx.uniforms.qubit_count;

    // The scratch operator is an internal op type, never a stream op
    if OpID::try_from(op.id).is_err() || op.id == ops::INJECTED {
        fail(shot, status::UNSUPPORTED_OP, op_idx);
        return;
    }
    if !validate_qubits(op, qubit_count) {
        fail(shot, status::INVALID_QUBIT, op_idx);
        return;
    }

    let lost = op
        .qubits()
        .iter()
        .any(|q| shot.lost_qubits & (1 << q) != 0);

    match op.id {
        ops::ID | ops::MOVE | ops::PARALLEL_START | ops::PARALLEL_END => {}
        ops::MEVERYZ => shot.op_type = ops::MEVERYZ,
        ops::MZ | ops::MRESETZ | ops::RESET => {
            let outcome = if lost {
                RESULT_LOST
            } else {
                measure(shot, op.q1, op.id != ops::MZ)
            };
            if op.id != ops::RESET
                && let Some(slot) = measurements.get_mut(op.q2 as usize)
            {
                *slot = outcome;
            }
        }
        ops::PAULI_NOISE_1Q if !lost => apply_pauli_noise_1q(shot, op),
        ops::PAULI_NOISE_2Q if !lost => apply_pauli_noise_2q(shot, op),
        ops::LOSS_NOISE if !lost => apply_loss(shot, op),
        ops::PAULI_NOISE_1Q | ops::PAULI_NOISE_2Q | ops::LOSS_NOISE => {}
        gate if !lost => shot.op_type = gate,
        _ => {}
    }

    if !lost && is_idle_noise_target(op.id) {
        inject_idle_noise(ctx, shot, op);
    }

    accrue_duration(shot, op, ctx.noise, qubit_count);
}

fn one_probability(qubit: &QubitState) -> f32 {
    let total = qubit.zero_probability + qubit.one_probability;
    if total > 0.0 {
        (qubit.one_probability / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn set_scratch_1q(shot: &mut ShotData, m: [Complex32; 4]) {
    shot.scratch[..4].copy_from_slice(&m);
    shot.injected_arity = 1;
    shot.op_type = ops::INJECTED;
}

/// Collapse `qubit` with the shot's measurement draw, optionally flipping a
/// |1⟩ outcome back to |0⟩. Returns the outcome.
fn measure(shot: &mut ShotData, qubit: u32, reset: bool) -> u32 {
    let state = &mut shot.qubits[qubit as usize];
    let p1 = one_probability(state);
    let outcome = shot.rand_measure < p1;
    let p = if outcome { p1 } else { 1.0 - p1 };
    let scale = Complex32::new(1.0 / p.sqrt(), 0.0);

    let projector = match (outcome, reset) {
        (false, _) => [scale, ZERO, ZERO, ZERO],
        (true, false) => [ZERO, ZERO, ZERO, scale],
        // Project onto |1⟩, then flip to |0⟩
        (true, true) => [ZERO, scale, ZERO, ZERO],
    };

    let ends_in_one = outcome && !reset;
    state.zero_probability = if ends_in_one { 0.0 } else { 1.0 };
    state.one_probability = if ends_in_one { 1.0 } else { 0.0 };

    set_scratch_1q(shot, projector);
    u32::from(outcome)
}

fn pauli_matrix(pauli: usize) -> [Complex32; 4] {
    match pauli {
        1 => [ZERO, ONE, ONE, ZERO],
        2 => [ZERO, Complex32::new(0.0, -1.0), Complex32::new(0.0, 1.0), ZERO],
        3 => [ONE, ZERO, ZERO, -ONE],
        _ => [ONE, ZERO, ZERO, ONE],
    }
}

/// Index of the first cumulative probability in `probabilities` above `rand`,
/// offset by one, or 0 when none is.
fn select_pauli(probabilities: impl Iterator<Item = f32>, rand: f32) -> usize {
    let mut cumulative = 0.0;
    for (i, p) in probabilities.enumerate() {
        cumulative += p;
        if rand < cumulative {
            return i + 1;
        }
    }
    0
}

fn apply_pauli_noise_1q(shot: &mut ShotData, op: &Op) {
    let pauli = select_pauli(op.matrix[1..4].iter().map(|c| c.re), shot.rand_pauli);
    if pauli != 0 {
        set_scratch_1q(shot, pauli_matrix(pauli));
    }
}

fn apply_pauli_noise_2q(shot: &mut ShotData, op: &Op) {
    let pauli = select_pauli(op.matrix[1..16].iter().map(|c| c.re), shot.rand_pauli);
    if pauli == 0 {
        return;
    }
    let first = pauli_matrix(pauli >> 2);
    let second = pauli_matrix(pauli & 3);
    for row in 0..4 {
        for col in 0..4 {
            shot.scratch[row * 4 + col] =
                first[(row >> 1) * 2 + (col >> 1)] * second[(row & 1) * 2 + (col & 1)];
        }
    }
    shot.injected_arity = 2;
    shot.op_type = ops::INJECTED;
}

fn apply_loss(shot: &mut ShotData, op: &Op) {
    let p_loss = op.matrix[0].re;
    if shot.rand_loss < p_loss {
        shot.lost_qubits |= 1 << op.q1;
        // A lost qubit is collapsed and parked in |0⟩
        measure(shot, op.q1, true);
    }
}

fn is_idle_noise_target(op_id: u32) -> bool {
    matches!(op_id, ops::ID | ops::MOVE | ops::X..=ops::RZ | ops::MATRIX)
}

/// Fuse the decay a due qubit accumulated while idle into the gate about to run on it.
fn inject_idle_noise(ctx: &KernelContext, shot: &mut ShotData, op: &Op) {
    let q = op.q1 as usize;
    if !is_due(&shot.qubits[q], ctx.noise) {
        return;
    }

    let gate = match shot.op_type {
        ops::RX | ops::RY | ops::RZ => rotation_1q(shot.op_type, op.angle),
        ops::ID => [ONE, ZERO, ZERO, ONE],
        _ => {
            let mut m = [ZERO; 4];
            m.copy_from_slice(op.dense_matrix(2));
            m
        }
    };

    let decay = decay_operator(
        shot.qubits[q].idle_time,
        one_probability(&shot.qubits[q]),
        ctx.noise,
        shot.rand_damping,
        shot.rand_dephase,
    );

    // scratch = gate · decay
    let mut fused = [ZERO; OP_MATRIX_CAPACITY];
    for row in 0..2 {
        for col in 0..2 {
            fused[row * 2 + col] =
                gate[row * 2] * decay[col] + gate[row * 2 + 1] * decay[2 + col];
        }
    }
    shot.scratch = fused;
    shot.injected_arity = 1;
    shot.op_type = ops::INJECTED;
    shot.qubits[q].idle_time = 0.0;
}
