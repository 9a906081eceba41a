// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[cfg(test)]
mod tests;

use std::f32::consts::FRAC_1_SQRT_2;

use bytemuck::{Pod, Zeroable};
use num_complex::Complex32;
use serde::Serialize;

// Keep the constants below in sync with the template values substituted into simulator.wgsl
pub const THREADS_PER_WORKGROUP: u32 = 32; // 32 gives good occupancy across various GPUs
pub const MAX_QUBITS_PER_WORKGROUP: u32 = 12; // 4096 amplitudes is the most one workgroup processes per dispatch
pub const MIN_QUBIT_COUNT: u32 = 10; // Round up circuit qubits if smaller so every thread has a full set of octets
pub const MAX_QUBIT_COUNT: u32 = 27; // 2^27 * 8 bytes fills the 1GB storage buffer limit
pub const MAX_BUFFER_SIZE: usize = 1 << 30; // 1 GB limit due to some wgpu restrictions
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65535; // WebGPU default for dispatch_workgroups
pub const MAX_CIRCUIT_OPS: usize = MAX_BUFFER_SIZE / std::mem::size_of::<Op>();

/// Qubit index meaning "every qubit" when used as the target of a reset.
pub const ALL_QUBITS: u32 = u32::MAX;

/// Value written to a measurement result slot when the measured qubit was lost.
pub const RESULT_LOST: u32 = 2;

/// Drift from unit norm tolerated before the next Execute rescales the state.
pub const RENORM_TOLERANCE: f32 = 1e-5;

/// Number of complex coefficients stored inline in every [`Op`]. Sized for a
/// dense 8x8 (three-qubit) operator; 1q and 2q operators use the first 4 or 16
/// entries with a row stride equal to their dimension.
pub const OP_MATRIX_CAPACITY: usize = 64;

/// Bytes before the matrix in an [`Op`]: four qubit/id words, the angle, and
/// three reserved words that keep the matrix 8-byte aligned for `vec2f`.
pub const OP_HEADER_SIZE: usize = 32;

/// Entries in the per-opcode duration table. Opcodes at or above this value
/// (noise ops) take no time.
pub const DURATION_TABLE_SIZE: usize = 32;

/// Slots per workgroup in the collation buffer: total norm, then one
/// probability per qubit, padded to a power of two.
pub const COLLATION_STRIDE: usize = 32;

#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OpID {
    Id = 0,
    Reset = 1,
    X = 2,
    Y = 3,
    Z = 4,
    H = 5,
    S = 6,
    SAdj = 7,
    T = 8,
    TAdj = 9,
    Sx = 10,
    SxAdj = 11,
    Rx = 12,
    Ry = 13,
    Rz = 14,
    Cx = 15,
    Cz = 16,
    Rxx = 17,
    Ryy = 18,
    Rzz = 19,
    Ccx = 20,
    Mz = 21,
    MResetZ = 22,
    MEveryZ = 23,
    Swap = 24,
    Matrix = 25,
    Matrix2Q = 26,
    Matrix3Q = 27,
    Move = 28,
    Injected = 29, // Apply the operator held in the shot's scratch buffer
    ParallelStart = 30,
    ParallelEnd = 31,
    PauliNoise1Q = 128,
    PauliNoise2Q = 129,
    LossNoise = 130,
}

impl OpID {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl From<OpID> for u32 {
    fn from(op_id: OpID) -> Self {
        op_id as u32
    }
}

impl TryFrom<u32> for OpID {
    type Error = u32;

    fn try_from(value: u32) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Id),
            1 => Ok(Self::Reset),
            2 => Ok(Self::X),
            3 => Ok(Self::Y),
            4 => Ok(Self::Z),
            5 => Ok(Self::H),
            6 => Ok(Self::S),
            7 => Ok(Self::SAdj),
            8 => Ok(Self::T),
            9 => Ok(Self::TAdj),
            10 => Ok(Self::Sx),
            11 => Ok(Self::SxAdj),
            12 => Ok(Self::Rx),
            13 => Ok(Self::Ry),
            14 => Ok(Self::Rz),
            15 => Ok(Self::Cx),
            16 => Ok(Self::Cz),
            17 => Ok(Self::Rxx),
            18 => Ok(Self::Ryy),
            19 => Ok(Self::Rzz),
            20 => Ok(Self::Ccx),
            21 => Ok(Self::Mz),
            22 => Ok(Self::MResetZ),
            23 => Ok(Self::MEveryZ),
            24 => Ok(Self::Swap),
            25 => Ok(Self::Matrix),
            26 => Ok(Self::Matrix2Q),
            27 => Ok(Self::Matrix3Q),
            28 => Ok(Self::Move),
            29 => Ok(Self::Injected),
            30 => Ok(Self::ParallelStart),
            31 => Ok(Self::ParallelEnd),
            128 => Ok(Self::PauliNoise1Q),
            129 => Ok(Self::PauliNoise2Q),
            130 => Ok(Self::LossNoise),
            invalid => Err(invalid),
        }
    }
}

// Operation identifiers used by the kernels.
pub mod ops {
    pub const ID: u32 = super::OpID::Id.as_u32();
    pub const RESET: u32 = super::OpID::Reset.as_u32();
    pub const X: u32 = super::OpID::X.as_u32();
    pub const Y: u32 = super::OpID::Y.as_u32();
    pub const Z: u32 = super::OpID::Z.as_u32();
    pub const H: u32 = super::OpID::H.as_u32();
    pub const S: u32 = super::OpID::S.as_u32();
    pub const S_ADJ: u32 = super::OpID::SAdj.as_u32();
    pub const T: u32 = super::OpID::T.as_u32();
    pub const T_ADJ: u32 = super::OpID::TAdj.as_u32();
    pub const SX: u32 = super::OpID::Sx.as_u32();
    pub const SX_ADJ: u32 = super::OpID::SxAdj.as_u32();
    pub const RX: u32 = super::OpID::Rx.as_u32();
    pub const RY: u32 = super::OpID::Ry.as_u32();
    pub const RZ: u32 = super::OpID::Rz.as_u32();
    pub const CX: u32 = super::OpID::Cx.as_u32();
    pub const CZ: u32 = super::OpID::Cz.as_u32();
    pub const RXX: u32 = super::OpID::Rxx.as_u32();
    pub const RYY: u32 = super::OpID::Ryy.as_u32();
    pub const RZZ: u32 = super::OpID::Rzz.as_u32();
    pub const CCX: u32 = super::OpID::Ccx.as_u32();
    pub const MZ: u32 = super::OpID::Mz.as_u32();
    pub const MRESETZ: u32 = super::OpID::MResetZ.as_u32();
    pub const MEVERYZ: u32 = super::OpID::MEveryZ.as_u32();
    pub const SWAP: u32 = super::OpID::Swap.as_u32();
    pub const MATRIX: u32 = super::OpID::Matrix.as_u32();
    pub const MATRIX_2Q: u32 = super::OpID::Matrix2Q.as_u32();
    pub const MATRIX_3Q: u32 = super::OpID::Matrix3Q.as_u32();
    pub const MOVE: u32 = super::OpID::Move.as_u32();
    pub const INJECTED: u32 = super::OpID::Injected.as_u32();
    pub const PARALLEL_START: u32 = super::OpID::ParallelStart.as_u32();
    pub const PARALLEL_END: u32 = super::OpID::ParallelEnd.as_u32();
    pub const PAULI_NOISE_1Q: u32 = super::OpID::PauliNoise1Q.as_u32();
    pub const PAULI_NOISE_2Q: u32 = super::OpID::PauliNoise2Q.as_u32();
    pub const LOSS_NOISE: u32 = super::OpID::LossNoise.as_u32();

    #[must_use]
    pub fn is_1q_op(op_id: u32) -> bool {
        matches!(
            op_id,
            ID | RESET
                | X
                | Y
                | Z
                | H
                | S
                | S_ADJ
                | T
                | T_ADJ
                | SX
                | SX_ADJ
                | RX
                | RY
                | RZ
                | MZ
                | MRESETZ
                | MATRIX
                | MOVE
                | PAULI_NOISE_1Q
                | LOSS_NOISE
        )
    }

    #[must_use]
    pub fn is_2q_op(op_id: u32) -> bool {
        matches!(
            op_id,
            CX | CZ | RXX | RYY | RZZ | SWAP | MATRIX_2Q | PAULI_NOISE_2Q
        )
    }

    #[must_use]
    pub fn is_3q_op(op_id: u32) -> bool {
        matches!(op_id, CCX | MATRIX_3Q)
    }

    #[must_use]
    pub fn is_noise_op(op_id: u32) -> bool {
        matches!(op_id, PAULI_NOISE_1Q | PAULI_NOISE_2Q | LOSS_NOISE)
    }

    #[must_use]
    pub fn is_measurement(op_id: u32) -> bool {
        matches!(op_id, MZ | MRESETZ)
    }

    /// Number of qubits an op from the stream addresses (0 for ops that act on
    /// the whole shot or on none).
    #[must_use]
    pub fn arity(op_id: u32) -> u32 {
        if is_1q_op(op_id) {
            1
        } else if is_2q_op(op_id) {
            2
        } else if is_3q_op(op_id) {
            3
        } else {
            0
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Op {
    pub id: u32,
    pub q1: u32,
    pub q2: u32,
    pub q3: u32, // For ccx and 3q matrices
    pub angle: f32,
    pub reserved: [u32; 3],
    pub matrix: [Complex32; OP_MATRIX_CAPACITY],
}

// safety check to make sure Op has the layout simulator.wgsl expects
const _: () = assert!(std::mem::size_of::<Op>() == OP_HEADER_SIZE + OP_MATRIX_CAPACITY * 8);
const _: () = assert!(std::mem::offset_of!(Op, matrix) == OP_HEADER_SIZE);

impl Default for Op {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl PartialEq for Op {
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

const fn c(re: f32, im: f32) -> Complex32 {
    Complex32::new(re, im)
}

/// Utility functions for creating gate operations
impl Op {
    /// Create a new Op with default values
    pub(crate) fn new_1q_gate(op_id: u32, qubit: u32) -> Self {
        Self {
            id: op_id,
            q1: qubit,
            ..Default::default()
        }
    }

    /// Create a new 2-qubit gate Op with default values
    pub(crate) fn new_2q_gate(op_id: u32, q1: u32, q2: u32) -> Self {
        Self {
            id: op_id,
            q1,
            q2,
            ..Default::default()
        }
    }

    fn new_3q_gate(op_id: u32, q1: u32, q2: u32, q3: u32) -> Self {
        Self {
            id: op_id,
            q1,
            q2,
            q3,
            ..Default::default()
        }
    }

    fn with_1q_matrix(mut self, m: [Complex32; 4]) -> Self {
        self.matrix[..4].copy_from_slice(&m);
        self
    }

    fn with_diagonal(mut self, diagonal: &[Complex32]) -> Self {
        let dim = diagonal.len();
        for (i, d) in diagonal.iter().enumerate() {
            self.matrix[i * dim + i] = *d;
        }
        self
    }

    /// Row-major entries of the `dim` x `dim` operator stored in the op.
    #[must_use]
    pub fn dense_matrix(&self, dim: usize) -> &[Complex32] {
        &self.matrix[..dim * dim]
    }

    /// Reset of every qubit in the shot, which also reinitializes the shot's control block
    #[must_use]
    pub fn new_reset_all() -> Self {
        Self::new_1q_gate(ops::RESET, ALL_QUBITS)
    }

    /// Reset of a single qubit: measure it, then flip it back to |0⟩ if needed
    #[must_use]
    pub fn new_reset_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::RESET, qubit)
    }

    #[must_use]
    pub fn new_m_every_z_gate() -> Self {
        Self::new_1q_gate(ops::MEVERYZ, 0)
    }

    /// Measure `qubit` in the Z basis, storing the outcome in result slot `result_id`
    #[must_use]
    pub fn new_mz_gate(qubit: u32, result_id: u32) -> Self {
        let mut op = Self::new_1q_gate(ops::MZ, qubit);
        // Store the result id in q2
        op.q2 = result_id;
        op
    }

    #[must_use]
    pub fn new_mresetz_gate(qubit: u32, result_id: u32) -> Self {
        let mut op = Self::new_1q_gate(ops::MRESETZ, qubit);
        op.q2 = result_id;
        // Matrix will need to be determined in the simulator based on the measurement outcome
        op
    }

    /// Identity gate: [[1, 0], [0, 1]]
    #[must_use]
    pub fn new_id_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::ID, qubit).with_diagonal(&[c(1.0, 0.0), c(1.0, 0.0)])
    }

    #[must_use]
    pub fn new_move_gate(qubit: u32) -> Self {
        // Treat is like an identity for now
        let mut op = Self::new_id_gate(qubit);
        op.id = ops::MOVE;
        op
    }

    /// X gate (Pauli-X): [[0, 1], [1, 0]]
    #[must_use]
    pub fn new_x_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::X, qubit).with_1q_matrix([
            c(0.0, 0.0),
            c(1.0, 0.0),
            c(1.0, 0.0),
            c(0.0, 0.0),
        ])
    }

    /// Y gate (Pauli-Y): [[0, -i], [i, 0]]
    #[must_use]
    pub fn new_y_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::Y, qubit).with_1q_matrix([
            c(0.0, 0.0),
            c(0.0, -1.0),
            c(0.0, 1.0),
            c(0.0, 0.0),
        ])
    }

    /// Z gate (Pauli-Z): [[1, 0], [0, -1]]
    #[must_use]
    pub fn new_z_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::Z, qubit).with_diagonal(&[c(1.0, 0.0), c(-1.0, 0.0)])
    }

    /// H gate (Hadamard): [[1/√2, 1/√2], [1/√2, -1/√2]]
    #[must_use]
    pub fn new_h_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::H, qubit).with_1q_matrix([
            c(FRAC_1_SQRT_2, 0.0),
            c(FRAC_1_SQRT_2, 0.0),
            c(FRAC_1_SQRT_2, 0.0),
            c(-FRAC_1_SQRT_2, 0.0),
        ])
    }

    /// S gate (Phase): [[1, 0], [0, i]]
    #[must_use]
    pub fn new_s_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::S, qubit).with_diagonal(&[c(1.0, 0.0), c(0.0, 1.0)])
    }

    /// S† gate (Phase adjoint): [[1, 0], [0, -i]]
    #[must_use]
    pub fn new_s_adj_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::S_ADJ, qubit).with_diagonal(&[c(1.0, 0.0), c(0.0, -1.0)])
    }

    /// T gate (π/8): [[1, 0], [0, e^(iπ/4)]]
    #[must_use]
    pub fn new_t_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::T, qubit)
            .with_diagonal(&[c(1.0, 0.0), c(FRAC_1_SQRT_2, FRAC_1_SQRT_2)])
    }

    /// T† gate (π/8 adjoint): [[1, 0], [0, e^(-iπ/4)]]
    #[must_use]
    pub fn new_t_adj_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::T_ADJ, qubit)
            .with_diagonal(&[c(1.0, 0.0), c(FRAC_1_SQRT_2, -FRAC_1_SQRT_2)])
    }

    /// SX gate (√X): [[1+i, 1-i], [1-i, 1+i]]/2
    #[must_use]
    pub fn new_sx_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::SX, qubit).with_1q_matrix([
            c(0.5, 0.5),
            c(0.5, -0.5),
            c(0.5, -0.5),
            c(0.5, 0.5),
        ])
    }

    /// SX† gate (√X adjoint): [[1-i, 1+i], [1+i, 1-i]]/2
    #[must_use]
    pub fn new_sx_adj_gate(qubit: u32) -> Self {
        Self::new_1q_gate(ops::SX_ADJ, qubit).with_1q_matrix([
            c(0.5, -0.5),
            c(0.5, 0.5),
            c(0.5, 0.5),
            c(0.5, -0.5),
        ])
    }

    /// RX gate (rotation around X): [[cos(θ/2), -i*sin(θ/2)], [-i*sin(θ/2), cos(θ/2)]]
    /// The coefficients are computed by the kernel from the angle.
    #[must_use]
    pub fn new_rx_gate(angle: f32, qubit: u32) -> Self {
        let mut op = Self::new_1q_gate(ops::RX, qubit);
        op.angle = angle;
        op
    }

    /// RY gate (rotation around Y): [[cos(θ/2), -sin(θ/2)], [sin(θ/2), cos(θ/2)]]
    #[must_use]
    pub fn new_ry_gate(angle: f32, qubit: u32) -> Self {
        let mut op = Self::new_1q_gate(ops::RY, qubit);
        op.angle = angle;
        op
    }

    /// RZ gate (rotation around Z): [[e^(-iθ/2), 0], [0, e^(iθ/2)]]
    #[must_use]
    pub fn new_rz_gate(angle: f32, qubit: u32) -> Self {
        let mut op = Self::new_1q_gate(ops::RZ, qubit);
        op.angle = angle;
        op
    }

    /// CX gate (CNOT): flips `target` when `control` is |1⟩
    #[must_use]
    pub fn new_cx_gate(control: u32, target: u32) -> Self {
        let mut op = Self::new_2q_gate(ops::CX, control, target);
        op.matrix[0] = c(1.0, 0.0);
        op.matrix[5] = c(1.0, 0.0);
        op.matrix[11] = c(1.0, 0.0);
        op.matrix[14] = c(1.0, 0.0);
        op
    }

    /// CZ gate (Controlled-Z): diag(1, 1, 1, -1)
    #[must_use]
    pub fn new_cz_gate(control: u32, target: u32) -> Self {
        Self::new_2q_gate(ops::CZ, control, target).with_diagonal(&[
            c(1.0, 0.0),
            c(1.0, 0.0),
            c(1.0, 0.0),
            c(-1.0, 0.0),
        ])
    }

    /// SWAP gate: exchanges the states of the two qubits
    #[must_use]
    pub fn new_swap_gate(qubit1: u32, qubit2: u32) -> Self {
        let mut op = Self::new_2q_gate(ops::SWAP, qubit1, qubit2);
        op.matrix[0] = c(1.0, 0.0);
        op.matrix[6] = c(1.0, 0.0);
        op.matrix[9] = c(1.0, 0.0);
        op.matrix[15] = c(1.0, 0.0);
        op
    }

    /// RXX gate: exp(-i*θ/2 * (X ⊗ X))
    #[must_use]
    pub fn new_rxx_gate(angle: f32, qubit1: u32, qubit2: u32) -> Self {
        let mut op = Self::new_2q_gate(ops::RXX, qubit1, qubit2);
        op.angle = angle;
        op
    }

    /// RYY gate: exp(-i*θ/2 * (Y ⊗ Y))
    #[must_use]
    pub fn new_ryy_gate(angle: f32, qubit1: u32, qubit2: u32) -> Self {
        let mut op = Self::new_2q_gate(ops::RYY, qubit1, qubit2);
        op.angle = angle;
        op
    }

    /// RZZ gate: exp(-i*θ/2 * (Z ⊗ Z))
    #[must_use]
    pub fn new_rzz_gate(angle: f32, qubit1: u32, qubit2: u32) -> Self {
        let mut op = Self::new_2q_gate(ops::RZZ, qubit1, qubit2);
        op.angle = angle;
        op
    }

    /// Toffoli gate: flips `target` when both controls are |1⟩
    #[must_use]
    pub fn new_ccx_gate(control1: u32, control2: u32, target: u32) -> Self {
        let mut op = Self::new_3q_gate(ops::CCX, control1, control2, target);
        for i in 0..6 {
            op.matrix[i * 8 + i] = c(1.0, 0.0);
        }
        op.matrix[6 * 8 + 7] = c(1.0, 0.0);
        op.matrix[7 * 8 + 6] = c(1.0, 0.0);
        op
    }

    /// Custom 1-qubit operation with arbitrary matrix elements
    /// K = [[m00, m01],
    ///      [m10, m11]]
    /// Used for quantum noise models and non-unitary operations
    #[must_use]
    pub fn new_matrix_gate(
        qubit: u32,
        m00: (f32, f32),
        m01: (f32, f32),
        m10: (f32, f32),
        m11: (f32, f32),
    ) -> Self {
        Self::new_1q_gate(ops::MATRIX, qubit).with_1q_matrix([
            c(m00.0, m00.1),
            c(m01.0, m01.1),
            c(m10.0, m10.1),
            c(m11.0, m11.1),
        ])
    }

    /// Custom 2-qubit operation with an arbitrary 4x4 matrix, given as rows of
    /// (real, imaginary) tuples. Row/column index is `2 * b(qubit1) + b(qubit2)`.
    #[must_use]
    pub fn new_matrix_2q_gate(qubit1: u32, qubit2: u32, rows: [[(f32, f32); 4]; 4]) -> Self {
        let mut op = Self::new_2q_gate(ops::MATRIX_2Q, qubit1, qubit2);
        for (r, row) in rows.iter().enumerate() {
            for (col, (re, im)) in row.iter().enumerate() {
                op.matrix[r * 4 + col] = c(*re, *im);
            }
        }
        op
    }

    /// Custom 3-qubit operation with an arbitrary 8x8 matrix.
    /// Row/column index is `4 * b(qubit1) + 2 * b(qubit2) + b(qubit3)`.
    #[must_use]
    pub fn new_matrix_3q_gate(
        qubit1: u32,
        qubit2: u32,
        qubit3: u32,
        rows: &[[Complex32; 8]; 8],
    ) -> Self {
        let mut op = Self::new_3q_gate(ops::MATRIX_3Q, qubit1, qubit2, qubit3);
        for (r, row) in rows.iter().enumerate() {
            op.matrix[r * 8..(r + 1) * 8].copy_from_slice(row);
        }
        op
    }

    /// Apply the operator held in the shot's scratch buffer
    #[must_use]
    pub fn new_injected_op(q1: u32, q2: u32, q3: u32) -> Self {
        Self::new_3q_gate(ops::INJECTED, q1, q2, q3)
    }

    #[must_use]
    pub fn new_parallel_start() -> Self {
        Self::new_1q_gate(ops::PARALLEL_START, 0)
    }

    #[must_use]
    pub fn new_parallel_end() -> Self {
        Self::new_1q_gate(ops::PARALLEL_END, 0)
    }

    // Use the 'real' parts of the matrix to store the pauli probabilities, indexed by Pauli code
    // (I = 0, X = 1, Y = 2, Z = 3).
    #[must_use]
    pub fn new_pauli_noise_1q(qubit: u32, p_x: f32, p_y: f32, p_z: f32) -> Self {
        let mut op = Self::new_1q_gate(ops::PAULI_NOISE_1Q, qubit);
        op.matrix[1].re = p_x;
        op.matrix[2].re = p_y;
        op.matrix[3].re = p_z;
        op
    }

    /// Two-qubit Pauli noise. `probabilities[4 * p1 + p2]` is the probability of
    /// applying Pauli `p1` to `q1` and `p2` to `q2`; entry 0 (II) is ignored.
    #[must_use]
    pub fn new_pauli_noise_2q(q1: u32, q2: u32, probabilities: &[f32; 16]) -> Self {
        let mut op = Self::new_2q_gate(ops::PAULI_NOISE_2Q, q1, q2);
        for (entry, p) in op.matrix.iter_mut().zip(probabilities).skip(1) {
            entry.re = *p;
        }
        op
    }

    #[must_use]
    pub fn new_loss_noise(qubit: u32, p_loss: f32) -> Self {
        let mut op = Self::new_1q_gate(ops::LOSS_NOISE, qubit);
        op.matrix[0].re = p_loss;
        op
    }

    /// The qubits this op addresses, in operand order.
    #[must_use]
    pub fn qubits(&self) -> &[u32] {
        // q1..q3 are the words after `id` in the header
        let words: &[u32] = bytemuck::cast_slice(std::slice::from_ref(self));
        let arity = ops::arity(self.id) as usize;
        &words[1..=arity]
    }
}

/// Per-qubit bookkeeping inside a shot's control block.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct QubitState {
    pub zero_probability: f32,
    pub one_probability: f32,
    /// Accumulated time the qubit spent in gates.
    pub heat: f32,
    /// Accumulated time since the qubit last had idle noise applied.
    pub idle_time: f32,
}

/// The control block each shot owns. Written by `prepare_op`, read by `execute_op`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ShotData {
    pub shot_id: u32,
    pub next_op_idx: u32,
    pub op_idx: u32,
    pub op_type: u32,
    pub rng_state: [u32; 4],
    pub rand_pauli: f32,
    pub rand_damping: f32,
    pub rand_dephase: f32,
    pub rand_measure: f32,
    pub rand_loss: f32,
    pub renormalize: f32,
    pub status: u32,
    pub status_op_idx: u32,
    pub elapsed: f32,
    pub region_duration: f32,
    pub region_qubits: u32,
    pub region_active: u32,
    pub lost_qubits: u32,
    pub injected_arity: u32,
    pub collect_probabilities: u32,
    pub padding: u32,
    pub qubits: [QubitState; MAX_QUBIT_COUNT as usize],
    pub scratch: [Complex32; OP_MATRIX_CAPACITY],
}

pub const SIZEOF_SHOTDATA: usize = std::mem::size_of::<ShotData>();
const _: () = assert!(SIZEOF_SHOTDATA == 1040);
const _: () = assert!(std::mem::offset_of!(ShotData, scratch) % 8 == 0);

impl Default for ShotData {
    fn default() -> Self {
        Self::zeroed()
    }
}

// Raw values of ShotData::status
pub mod status {
    pub const OK: u32 = 0;
    pub const UNSUPPORTED_OP: u32 = 1;
    pub const INVALID_QUBIT: u32 = 2;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub batch_start_shot_id: u32,
    pub rng_seed: u32,
    pub shot_count: u32,
    pub qubit_count: u32, // Qubits in the circuit (before rounding up to MIN_QUBIT_COUNT)
    pub result_threshold: f32,
    pub results_per_shot: u32,
    pub result_count: u32,
    pub op_count: u32,
}

/// Coherence and timing parameters read by `prepare_op`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct NoiseParams {
    pub t1: f32,
    pub t2: f32,
    pub due_threshold: f32,
    pub idle_noise_enabled: u32,
    pub durations: [f32; DURATION_TABLE_SIZE],
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl NoiseParams {
    #[must_use]
    pub fn duration(&self, op_id: u32) -> f32 {
        self.durations
            .get(op_id as usize)
            .copied()
            .unwrap_or_default()
    }
}

/// Partial sums one workgroup writes after each Execute, summed by the next Prepare.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct WorkgroupSums {
    pub total: f32,
    pub one_probabilities: [f32; COLLATION_STRIDE - 1],
}

impl Default for WorkgroupSums {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable, Serialize)]
pub struct ResultRecord {
    pub entry_idx: u32,
    pub probability: f32,
}
