// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The two compute kernels, written against plain slices.
//!
//! `prepare_op` runs once per shot and does all of the sequential work for a
//! step: advancing the op cursor, drawing random numbers, folding in the
//! previous step's collation, and resolving the op into something Execute can
//! apply without branching on shot state. `execute_op` runs once per workgroup
//! and updates the amplitudes of one shard of one shot. `simulator.wgsl` is a
//! line-for-line port of these functions, and the CPU grid runs them directly.


mod execute;
mod noise;
mod prepare;

use std::sync::atomic::{AtomicU32, Ordering};

pub use execute::{ExecuteMode, execute_mode, execute_op, op_fits_in_shard};
pub use noise::{accrue_duration, decay_operator, is_due};
pub use prepare::prepare_op;

pub(crate) use execute::rotation_1q;

use crate::shader_types::{
    MAX_QUBITS_PER_WORKGROUP, MIN_QUBIT_COUNT, NoiseParams, Op, ResultRecord,
    THREADS_PER_WORKGROUP, Uniforms,
};

/// How a shot's amplitudes are split across workgroups and threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShotLayout {
    /// Qubits allocated per shot (the circuit's count rounded up to `MIN_QUBIT_COUNT`).
    pub qubit_count: u32,
    pub workgroups_per_shot: u32,
    pub entries_per_thread: u32,
}

impl ShotLayout {
    #[must_use]
    pub fn new(circuit_qubits: u32, max_qubits_per_workgroup: u32) -> Self {
        let qubit_count = circuit_qubits.max(MIN_QUBIT_COUNT);
        let max_qubits_per_workgroup = max_qubits_per_workgroup.min(MAX_QUBITS_PER_WORKGROUP);
        let workgroups_per_shot = if qubit_count <= max_qubits_per_workgroup {
            1
        } else {
            1 << (qubit_count - max_qubits_per_workgroup)
        };
        let entries_per_thread = (1u32 << qubit_count) / workgroups_per_shot / THREADS_PER_WORKGROUP;
        Self {
            qubit_count,
            workgroups_per_shot,
            entries_per_thread,
        }
    }

    #[must_use]
    pub fn entries_per_shot(&self) -> usize {
        1 << self.qubit_count
    }

    #[must_use]
    pub fn entries_per_workgroup(&self) -> usize {
        self.entries_per_thread as usize * THREADS_PER_WORKGROUP as usize
    }

    /// Index bits that stay inside one workgroup's contiguous shard.
    #[must_use]
    pub fn shard_bits(&self) -> u32 {
        self.entries_per_workgroup().trailing_zeros()
    }
}

/// Everything a kernel invocation reads besides its own shot's buffers.
#[derive(Clone, Copy, Debug)]
pub struct KernelContext<'a> {
    pub ops: &'a [Op],
    pub uniforms: &'a Uniforms,
    pub noise: &'a NoiseParams,
    pub layout: ShotLayout,
}

/// One slot of the results buffer. Extraction workers write slots they
/// reserved from the shot's cursor, so slots are stored as atomics.
#[derive(Debug, Default)]
pub struct AtomicRecord {
    entry_idx: AtomicU32,
    probability: AtomicU32,
}

impl AtomicRecord {
    pub fn store(&self, record: ResultRecord) {
        self.entry_idx.store(record.entry_idx, Ordering::Relaxed);
        self.probability
            .store(record.probability.to_bits(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn load(&self) -> ResultRecord {
        ResultRecord {
            entry_idx: self.entry_idx.load(Ordering::Relaxed),
            probability: f32::from_bits(self.probability.load(Ordering::Relaxed)),
        }
    }
}

/// A shot's region of the results buffer together with its cursor.
#[derive(Clone, Copy, Debug)]
pub struct ShotResultsView<'a> {
    pub cursor: &'a AtomicU32,
    pub slots: &'a [AtomicRecord],
}
