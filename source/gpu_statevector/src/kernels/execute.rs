// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::Ordering;

use num_complex::Complex32;

use super::{KernelContext, ShotResultsView};
use crate::addressing::{next_pair_offset, octet_members, pair_offset, quad_members, worker_items};
use crate::shader_types::{
    COLLATION_STRIDE, OP_MATRIX_CAPACITY, Op, ResultRecord, ShotData, THREADS_PER_WORKGROUP,
    WorkgroupSums, ops,
};

/// The shape of work an Execute dispatch does for a shot, decided from the op
/// type Prepare selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteMode {
    /// Write |0...0⟩ over the whole block.
    ResetAll,
    /// Report probabilities above the threshold.
    Extract,
    /// Only apply the pending rescale.
    ScaleOnly,
    Gate1Q,
    Gate2Q,
    Gate3Q,
}

impl ExecuteMode {
    /// Contiguous modes give every worker a contiguous index range.
    #[must_use]
    pub fn is_contiguous(self) -> bool {
        matches!(self, Self::ResetAll | Self::Extract | Self::ScaleOnly)
    }
}

#[must_use]
pub fn execute_mode(shot: &ShotData) -> ExecuteMode {
    match shot.op_type {
        ops::RESET => ExecuteMode::ResetAll,
        ops::MEVERYZ => ExecuteMode::Extract,
        ops::INJECTED => match shot.injected_arity {
            1 => ExecuteMode::Gate1Q,
            2 => ExecuteMode::Gate2Q,
            3 => ExecuteMode::Gate3Q,
            _ => ExecuteMode::ScaleOnly,
        },
        op_type if op_type != ops::ID && ops::is_1q_op(op_type) => ExecuteMode::Gate1Q,
        op_type if ops::is_2q_op(op_type) => ExecuteMode::Gate2Q,
        op_type if ops::is_3q_op(op_type) => ExecuteMode::Gate3Q,
        _ => ExecuteMode::ScaleOnly,
    }
}

/// True when every amplitude the workgroups of this step touch lies in the
/// workgroup's own contiguous shard, so workgroups can run independently.
#[must_use]
pub fn op_fits_in_shard(ctx: &KernelContext, shot: &ShotData) -> bool {
    let mode = execute_mode(shot);
    if mode.is_contiguous() {
        return true;
    }
    let op = &ctx.ops[shot.op_idx as usize];
    let arity = match mode {
        ExecuteMode::Gate1Q => 1,
        ExecuteMode::Gate2Q => 2,
        _ => 3,
    };
    let shard_bits = ctx.layout.shard_bits();
    [op.q1, op.q2, op.q3]
        .iter()
        .take(arity)
        .all(|q| *q < shard_bits)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    /// Swap two members of the group.
    Swap(usize, usize),
    /// Scale each member by its diagonal entry.
    Diagonal,
    Dense,
}

/// Operator for one step, with `m` row-major with row stride `dim`.
struct Operator {
    dim: usize,
    shape: Shape,
    m: [Complex32; OP_MATRIX_CAPACITY],
}

impl Operator {
    fn from_slice(dim: usize, shape: Shape, entries: &[Complex32]) -> Self {
        let mut m = [Complex32::new(0.0, 0.0); OP_MATRIX_CAPACITY];
        m[..entries.len()].copy_from_slice(entries);
        Self { dim, shape, m }
    }

    fn apply(&self, amps: &mut [Complex32]) {
        match self.shape {
            Shape::Swap(a, b) => amps.swap(a, b),
            Shape::Diagonal => {
                for (i, amp) in amps.iter_mut().enumerate() {
                    *amp *= self.m[i * self.dim + i];
                }
            }
            Shape::Dense => {
                let mut input = [Complex32::new(0.0, 0.0); 8];
                input[..self.dim].copy_from_slice(amps);
                for (row, amp) in amps.iter_mut().enumerate() {
                    let coefficients = &self.m[row * self.dim..(row + 1) * self.dim];
                    *amp = coefficients
                        .iter()
                        .zip(&input[..self.dim])
                        .fold(Complex32::new(0.0, 0.0), |acc, (c, a)| acc + c * a);
                }
            }
        }
    }
}

/// Rx, Ry or Rz for `angle`, row-major.
#[must_use]
pub(crate) fn rotation_1q(op_id: u32, angle: f32) -> [Complex32; 4] {
    let (s, c) = (angle / 2.0).sin_cos();
    let zero = Complex32::new(0.0, 0.0);
    match op_id {
        ops::RX => [
            Complex32::new(c, 0.0),
            Complex32::new(0.0, -s),
            Complex32::new(0.0, -s),
            Complex32::new(c, 0.0),
        ],
        ops::RY => [
            Complex32::new(c, 0.0),
            Complex32::new(-s, 0.0),
            Complex32::new(s, 0.0),
            Complex32::new(c, 0.0),
        ],
        _ => [Complex32::new(c, -s), zero, zero, Complex32::new(c, s)],
    }
}

/// Rxx, Ryy or Rzz for `angle`, row-major over the local index `2 * b(q1) + b(q2)`.
#[must_use]
pub(crate) fn rotation_2q(op_id: u32, angle: f32) -> [Complex32; 16] {
    let (s, c) = (angle / 2.0).sin_cos();
    let mut m = [Complex32::new(0.0, 0.0); 16];
    match op_id {
        ops::RXX => {
            for i in 0..4 {
                m[i * 4 + i] = Complex32::new(c, 0.0);
                m[i * 4 + (3 - i)] = Complex32::new(0.0, -s);
            }
        }
        ops::RYY => {
            for i in 0..4 {
                m[i * 4 + i] = Complex32::new(c, 0.0);
            }
            // Y⊗Y has -1 on the outer anti-diagonal and +1 on the inner one
            m[3] = Complex32::new(0.0, s);
            m[6] = Complex32::new(0.0, -s);
            m[9] = Complex32::new(0.0, -s);
            m[12] = Complex32::new(0.0, s);
        }
        _ => {
            let even = Complex32::new(c, -s);
            let odd = Complex32::new(c, s);
            m[0] = even;
            m[5] = odd;
            m[10] = odd;
            m[15] = even;
        }
    }
    m
}

fn load_operator(shot: &ShotData, op: &Op) -> Operator {
    match shot.op_type {
        ops::X => Operator::from_slice(2, Shape::Swap(0, 1), &[]),
        ops::Z | ops::S | ops::S_ADJ | ops::T | ops::T_ADJ => {
            Operator::from_slice(2, Shape::Diagonal, op.dense_matrix(2))
        }
        ops::RZ => Operator::from_slice(2, Shape::Diagonal, &rotation_1q(ops::RZ, op.angle)),
        ops::RX | ops::RY => {
            Operator::from_slice(2, Shape::Dense, &rotation_1q(shot.op_type, op.angle))
        }
        ops::CX => Operator::from_slice(4, Shape::Swap(2, 3), &[]),
        ops::SWAP => Operator::from_slice(4, Shape::Swap(1, 2), &[]),
        ops::CZ => Operator::from_slice(4, Shape::Diagonal, op.dense_matrix(4)),
        ops::RZZ => Operator::from_slice(4, Shape::Diagonal, &rotation_2q(ops::RZZ, op.angle)),
        ops::RXX | ops::RYY => {
            Operator::from_slice(4, Shape::Dense, &rotation_2q(shot.op_type, op.angle))
        }
        ops::MATRIX_2Q => Operator::from_slice(4, Shape::Dense, op.dense_matrix(4)),
        ops::CCX => Operator::from_slice(8, Shape::Swap(6, 7), &[]),
        ops::MATRIX_3Q => Operator::from_slice(8, Shape::Dense, op.dense_matrix(8)),
        ops::INJECTED => {
            let dim = 1usize << shot.injected_arity;
            Operator::from_slice(dim, Shape::Dense, &shot.scratch[..dim * dim])
        }
        // Y, H, Sx, SxAdj and caller-supplied 1q matrices
        _ => Operator::from_slice(2, Shape::Dense, op.dense_matrix(2)),
    }
}

/// Per-thread partial sums, folded into the workgroup's collation at the end.
#[derive(Clone, Copy)]
struct Partial {
    sums: [f32; COLLATION_STRIDE],
}

impl Partial {
    fn add(&mut self, idx: usize, amp: Complex32, collect: bool, qubit_count: u32) {
        let probability = amp.norm_sqr();
        self.sums[0] += probability;
        if collect {
            for q in 0..qubit_count as usize {
                if (idx >> q) & 1 != 0 {
                    self.sums[q + 1] += probability;
                }
            }
        }
    }
}

/// Execute one workgroup's share of the step selected by `prepare_op`.
///
/// `block` holds the shot's amplitudes starting at shot index `block_base`; it
/// must cover every index this workgroup touches (its own shard when
/// [`op_fits_in_shard`] holds, otherwise the whole shot).
pub fn execute_op(
    ctx: &KernelContext,
    workgroup: u32,
    shot: &ShotData,
    block: &mut [Complex32],
    block_base: usize,
    sums: &mut WorkgroupSums,
    results: &ShotResultsView,
) {
    let mode = execute_mode(shot);
    let op = ctx.ops.get(shot.op_idx as usize).copied().unwrap_or_default();
    let operator = match mode {
        ExecuteMode::Gate1Q | ExecuteMode::Gate2Q | ExecuteMode::Gate3Q => {
            Some(load_operator(shot, &op))
        }
        _ => None,
    };
    let collect = shot.collect_probabilities != 0;
    let qubit_count = ctx.uniforms.qubit_count;
    let scale = shot.renormalize;
    let entries_per_thread = ctx.layout.entries_per_thread as usize;

    let mut partials = [Partial {
        sums: [0.0; COLLATION_STRIDE],
    }; THREADS_PER_WORKGROUP as usize];

    for (thread, partial) in (0u32..).zip(partials.iter_mut()) {
        let worker = (workgroup * THREADS_PER_WORKGROUP + thread) as usize;
        match (mode, &operator) {
            (ExecuteMode::ResetAll, _) => {
                for idx in worker_items(worker, entries_per_thread) {
                    let amp = if idx == 0 {
                        Complex32::new(1.0, 0.0)
                    } else {
                        Complex32::new(0.0, 0.0)
                    };
                    block[idx - block_base] = amp;
                    partial.add(idx, amp, collect, qubit_count);
                }
            }
            (ExecuteMode::Extract, _) => {
                extract_range(ctx, worker, shot, block, block_base, results);
                for idx in worker_items(worker, entries_per_thread) {
                    partial.add(idx, block[idx - block_base], collect, qubit_count);
                }
            }
            (ExecuteMode::Gate1Q, Some(operator)) => {
                let stride = 1usize << op.q1;
                let items = worker_items(worker, entries_per_thread / 2);
                let mut offset = pair_offset(items.start, op.q1);
                for _ in items {
                    let members = [offset, offset | stride];
                    apply_group(block, block_base, &members, operator, scale, partial, collect, qubit_count);
                    offset = next_pair_offset(offset, stride);
                }
            }
            (ExecuteMode::Gate2Q, Some(operator)) => {
                for item in worker_items(worker, entries_per_thread / 4) {
                    let members = quad_members(item, op.q1, op.q2);
                    apply_group(block, block_base, &members, operator, scale, partial, collect, qubit_count);
                }
            }
            (ExecuteMode::Gate3Q, Some(operator)) => {
                for item in worker_items(worker, entries_per_thread / 8) {
                    let members = octet_members(item, op.q1, op.q2, op.q3);
                    apply_group(block, block_base, &members, operator, scale, partial, collect, qubit_count);
                }
            }
            _ => {
                for idx in worker_items(worker, entries_per_thread) {
                    let amp = block[idx - block_base] * scale;
                    block[idx - block_base] = amp;
                    partial.add(idx, amp, collect, qubit_count);
                }
            }
        }
    }

    // Fold thread partials in thread order so the sum is the same on every device
    *sums = WorkgroupSums::default();
    for partial in &partials {
        sums.total += partial.sums[0];
        for (total, value) in sums.one_probabilities.iter_mut().zip(&partial.sums[1..]) {
            *total += value;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_group(
    block: &mut [Complex32],
    block_base: usize,
    members: &[usize],
    operator: &Operator,
    scale: f32,
    partial: &mut Partial,
    collect: bool,
    qubit_count: u32,
) {
    let mut amps = [Complex32::new(0.0, 0.0); 8];
    let amps = &mut amps[..members.len()];
    for (amp, idx) in amps.iter_mut().zip(members) {
        *amp = block[idx - block_base] * scale;
    }
    operator.apply(amps);
    for (amp, idx) in amps.iter().zip(members) {
        block[idx - block_base] = *amp;
        partial.add(*idx, *amp, collect, qubit_count);
    }
}

fn extract_range(
    ctx: &KernelContext,
    worker: usize,
    shot: &ShotData,
    block: &[Complex32],
    block_base: usize,
    results: &ShotResultsView,
) {
    let scale = shot.renormalize * shot.renormalize;
    let threshold = ctx.uniforms.result_threshold;
    for idx in worker_items(worker, ctx.layout.entries_per_thread as usize) {
        let probability = block[idx - block_base].norm_sqr() * scale;
        if probability > threshold {
            let slot = results.cursor.fetch_add(1, Ordering::Relaxed) as usize;
            // Past capacity the record is dropped, but the cursor still counts it
            if let Some(record) = results.slots.get(slot) {
                #[allow(clippy::cast_possible_truncation)]
                record.store(ResultRecord {
                    entry_idx: idx as u32,
                    probability,
                });
            }
        }
    }
}
