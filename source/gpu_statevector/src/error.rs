// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Serialize;
use thiserror::Error;

use crate::shader_types::{MAX_BUFFER_SIZE, MAX_QUBIT_COUNT, Op, ShotData, status};

pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that stop a run before (or while) anything is dispatched.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SimError {
    #[error("qubit count {0} is outside the supported range 1..={max}", max = MAX_QUBIT_COUNT)]
    QubitCount(u32),

    #[error("shot count must be at least 1")]
    NoShots,

    #[error("no program has been set")]
    EmptyProgram,

    #[error("program has {0} ops, which does not fit in a single ops buffer")]
    ProgramTooLarge(usize),

    #[error("op {op_idx} addresses qubit {qubit} but the circuit only has {qubit_count} qubits")]
    QubitOutOfRange {
        op_idx: usize,
        qubit: u32,
        qubit_count: u32,
    },

    #[error("op {op_idx} uses qubit {qubit} more than once")]
    DuplicateQubit { op_idx: usize, qubit: u32 },

    #[error("op {op_idx} writes result {result_id} but only {result_count} results are allocated")]
    ResultOutOfRange {
        op_idx: usize,
        result_id: u32,
        result_count: u32,
    },

    #[error("result threshold {0} must be finite and in the range [0, 1)")]
    InvalidThreshold(f32),

    #[error("invalid noise parameters: {0}")]
    InvalidNoise(String),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("{what} needs {size} bytes, over the {max} byte buffer limit", max = MAX_BUFFER_SIZE)]
    BufferTooLarge { what: &'static str, size: usize },

    #[error("GPU device error: {0}")]
    Device(String),
}

/// Outcome of a single shot, decoded from the status words in its control block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ShotStatus {
    #[default]
    Ok,
    /// The op at `op_idx` in the submitted program has an opcode the kernels do not know.
    ///
    /// `OpID::Injected` is also rejected here. It names the operator a shot
    /// builds for itself during Prepare (measurement projectors, noise, idle
    /// decay), and that scratch operator belongs to one shot at one step, so a
    /// program has no defined operator to refer to with it.
    UnsupportedOperation { op_idx: u32, opcode: u32 },
    /// The op at `op_idx` in the submitted program addressed a qubit outside the
    /// circuit, or the same qubit twice.
    InvalidQubit { op_idx: u32 },
}

impl ShotStatus {
    /// Decode a shot's status. `executed` is the op stream the device ran, and
    /// `origin[i]` is the index in the caller's program that produced `executed[i]`.
    #[must_use]
    pub fn from_shot_data(shot: &ShotData, executed: &[Op], origin: &[usize]) -> Self {
        let device_idx = shot.status_op_idx as usize;
        let op_idx = origin
            .get(device_idx)
            .and_then(|idx| u32::try_from(*idx).ok())
            .unwrap_or(shot.status_op_idx);
        match shot.status {
            status::OK => Self::Ok,
            status::UNSUPPORTED_OP => Self::UnsupportedOperation {
                op_idx,
                opcode: executed.get(device_idx).map_or(u32::MAX, |op| op.id),
            },
            _ => Self::InvalidQubit { op_idx },
        }
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}
