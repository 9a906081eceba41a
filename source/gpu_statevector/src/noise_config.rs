// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.


use crate::error::{Result, SimError};
use crate::shader_types::{DURATION_TABLE_SIZE, NoiseParams, OpID};

/// Noise description for each operation.
///
/// Every gate is followed by its table's Pauli noise and loss when the table is
/// not noiseless.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseConfig {
    pub i: NoiseTable,
    pub x: NoiseTable,
    pub y: NoiseTable,
    pub z: NoiseTable,
    pub h: NoiseTable,
    pub s: NoiseTable,
    pub s_adj: NoiseTable,
    pub t: NoiseTable,
    pub t_adj: NoiseTable,
    pub sx: NoiseTable,
    pub sx_adj: NoiseTable,
    pub rx: NoiseTable,
    pub ry: NoiseTable,
    pub rz: NoiseTable,
    pub cx: NoiseTable,
    pub cz: NoiseTable,
    pub rxx: NoiseTable,
    pub ryy: NoiseTable,
    pub rzz: NoiseTable,
    pub swap: NoiseTable,
    pub mov: NoiseTable,
    pub mz: NoiseTable,
    pub mresetz: NoiseTable,
}

impl NoiseConfig {
    pub const NOISELESS: Self = Self {
        i: NoiseTable::noiseless(1),
        x: NoiseTable::noiseless(1),
        y: NoiseTable::noiseless(1),
        z: NoiseTable::noiseless(1),
        h: NoiseTable::noiseless(1),
        s: NoiseTable::noiseless(1),
        s_adj: NoiseTable::noiseless(1),
        t: NoiseTable::noiseless(1),
        t_adj: NoiseTable::noiseless(1),
        sx: NoiseTable::noiseless(1),
        sx_adj: NoiseTable::noiseless(1),
        rx: NoiseTable::noiseless(1),
        ry: NoiseTable::noiseless(1),
        rz: NoiseTable::noiseless(1),
        cx: NoiseTable::noiseless(2),
        cz: NoiseTable::noiseless(2),
        rxx: NoiseTable::noiseless(2),
        ryy: NoiseTable::noiseless(2),
        rzz: NoiseTable::noiseless(2),
        swap: NoiseTable::noiseless(2),
        mov: NoiseTable::noiseless(1),
        mz: NoiseTable::noiseless(1),
        mresetz: NoiseTable::noiseless(1),
    };

    /// Every 1q gate gets `one_qubit`, every 2q gate gets `two_qubit`.
    #[must_use]
    pub fn uniform(one_qubit: &NoiseTable, two_qubit: &NoiseTable) -> Self {
        Self {
            i: one_qubit.clone(),
            x: one_qubit.clone(),
            y: one_qubit.clone(),
            z: one_qubit.clone(),
            h: one_qubit.clone(),
            s: one_qubit.clone(),
            s_adj: one_qubit.clone(),
            t: one_qubit.clone(),
            t_adj: one_qubit.clone(),
            sx: one_qubit.clone(),
            sx_adj: one_qubit.clone(),
            rx: one_qubit.clone(),
            ry: one_qubit.clone(),
            rz: one_qubit.clone(),
            cx: two_qubit.clone(),
            cz: two_qubit.clone(),
            rxx: two_qubit.clone(),
            ryy: two_qubit.clone(),
            rzz: two_qubit.clone(),
            swap: two_qubit.clone(),
            mov: one_qubit.clone(),
            mz: NoiseTable::noiseless(1),
            mresetz: NoiseTable::noiseless(1),
        }
    }

    fn tables(&self) -> [(&'static str, &NoiseTable, u32); 23] {
        [
            ("i", &self.i, 1),
            ("x", &self.x, 1),
            ("y", &self.y, 1),
            ("z", &self.z, 1),
            ("h", &self.h, 1),
            ("s", &self.s, 1),
            ("s_adj", &self.s_adj, 1),
            ("t", &self.t, 1),
            ("t_adj", &self.t_adj, 1),
            ("sx", &self.sx, 1),
            ("sx_adj", &self.sx_adj, 1),
            ("rx", &self.rx, 1),
            ("ry", &self.ry, 1),
            ("rz", &self.rz, 1),
            ("cx", &self.cx, 2),
            ("cz", &self.cz, 2),
            ("rxx", &self.rxx, 2),
            ("ryy", &self.ryy, 2),
            ("rzz", &self.rzz, 2),
            ("swap", &self.swap, 2),
            ("mov", &self.mov, 1),
            ("mz", &self.mz, 1),
            ("mresetz", &self.mresetz, 1),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (name, table, qubits) in self.tables() {
            if table.qubits != qubits {
                return Err(SimError::InvalidNoise(format!(
                    "table `{name}` is for {} qubits, expected {qubits}",
                    table.qubits
                )));
            }
            table
                .validate()
                .map_err(|e| SimError::InvalidNoise(format!("table `{name}`: {e}")))?;
        }
        Ok(())
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self::NOISELESS
    }
}

/// Noise description for an operation.
///
/// `pauli_strings[i]` contains the ith Pauli string
/// specified by the user (such as `"X"` or `"ZI"`), which we need to apply
/// with the probability `probabilities[i]`. All pauli
/// strings are mutually exclusive. Therefore, their probabilities
/// must add up to a number less or equal than `1.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseTable {
    pub qubits: u32,
    pub pauli_strings: Vec<String>,
    pub probabilities: Vec<f32>,
    pub loss: f32,
}

impl NoiseTable {
    #[must_use]
    pub const fn noiseless(qubits: u32) -> Self {
        Self {
            qubits,
            pauli_strings: Vec::new(),
            probabilities: Vec::new(),
            loss: 0.0,
        }
    }

    /// Independent X, Y and Z flips on one qubit.
    #[must_use]
    pub fn pauli(x: f32, y: f32, z: f32) -> Self {
        Self {
            qubits: 1,
            pauli_strings: vec!["X".into(), "Y".into(), "Z".into()],
            probabilities: vec![x, y, z],
            loss: 0.0,
        }
    }

    /// Depolarizing noise: each non-identity Pauli string on `qubits` qubits
    /// with equal share of probability `p`.
    #[must_use]
    pub fn depolarizing(qubits: u32, p: f32) -> Self {
        let strings: Vec<String> = match qubits {
            1 => ["X", "Y", "Z"].iter().map(ToString::to_string).collect(),
            _ => (1..16)
                .map(|code| format!("{}{}", pauli_char(code >> 2), pauli_char(code & 3)))
                .collect(),
        };
        #[allow(clippy::cast_precision_loss)]
        let share = p / strings.len() as f32;
        Self {
            qubits,
            probabilities: vec![share; strings.len()],
            pauli_strings: strings,
            loss: 0.0,
        }
    }

    #[must_use]
    pub fn with_loss(mut self, loss: f32) -> Self {
        self.loss = loss;
        self
    }

    #[must_use]
    pub fn is_noiseless(&self) -> bool {
        self.probabilities.iter().all(|p| *p == 0.0) && self.loss == 0.0
    }

    #[must_use]
    pub fn has_pauli_noise(&self) -> bool {
        self.probabilities.iter().any(|p| *p > 0.0)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.pauli_strings.len() != self.probabilities.len() {
            return Err(format!(
                "{} pauli strings but {} probabilities",
                self.pauli_strings.len(),
                self.probabilities.len()
            ));
        }
        for pauli in &self.pauli_strings {
            if pauli_code(pauli, self.qubits).is_none() {
                return Err(format!("invalid pauli string `{pauli}`"));
            }
        }
        let in_range = |p: f32| p.is_finite() && (0.0..=1.0).contains(&p);
        if let Some(p) = self.probabilities.iter().find(|p| !in_range(**p)) {
            return Err(format!("probability {p} is not in [0, 1]"));
        }
        let total: f32 = self.probabilities.iter().sum();
        if total > 1.0 + f32::EPSILON {
            return Err(format!("probabilities add up to {total}, more than 1"));
        }
        if !in_range(self.loss) {
            return Err(format!("loss probability {} is not in [0, 1]", self.loss));
        }
        Ok(())
    }

    /// Probabilities indexed by Pauli code (I = 0, X = 1, Y = 2, Z = 3; `4 * first + second`
    /// for two qubits). Strings that do not parse are skipped.
    #[must_use]
    pub fn probability_table(&self) -> [f32; 16] {
        let mut table = [0.0; 16];
        for (pauli, p) in self.pauli_strings.iter().zip(&self.probabilities) {
            if let Some(code) = pauli_code(pauli, self.qubits) {
                table[code] += *p;
            }
        }
        table
    }
}

fn pauli_char(code: usize) -> char {
    ['I', 'X', 'Y', 'Z'][code & 3]
}

fn pauli_code(pauli: &str, qubits: u32) -> Option<usize> {
    if pauli.chars().count() != qubits as usize {
        return None;
    }
    pauli.chars().try_fold(0, |code, c| {
        let digit = match c.to_ascii_uppercase() {
            'I' => 0,
            'X' => 1,
            'Y' => 2,
            'Z' => 3,
            _ => return None,
        };
        Some(code * 4 + digit)
    })
}

pub const DEFAULT_DUE_FRACTION: f32 = 0.05;

/// Idle decoherence driven by T1 (amplitude damping) and T2 (dephasing), with
/// the time each op takes. Times are in the same arbitrary unit throughout.
///
/// A qubit that has been idle for `due_fraction * min(t1, t2)` gets the decay
/// for its idle time applied just before the next single-qubit op on it.
#[derive(Clone, Debug, PartialEq)]
pub struct IdleNoiseConfig {
    pub t1: f32,
    pub t2: f32,
    pub due_fraction: f32,
    pub durations: [f32; DURATION_TABLE_SIZE],
}

impl IdleNoiseConfig {
    #[must_use]
    pub fn new(t1: f32, t2: f32) -> Self {
        Self {
            t1,
            t2,
            due_fraction: DEFAULT_DUE_FRACTION,
            durations: [0.0; DURATION_TABLE_SIZE],
        }
    }

    #[must_use]
    pub fn with_due_fraction(mut self, due_fraction: f32) -> Self {
        self.due_fraction = due_fraction;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, op: OpID, duration: f32) -> Self {
        if let Some(slot) = self.durations.get_mut(op.as_u32() as usize) {
            *slot = duration;
        }
        self
    }

    /// Same duration for every op in `ops`.
    #[must_use]
    pub fn with_durations(mut self, ops: &[OpID], duration: f32) -> Self {
        for op in ops {
            self = self.with_duration(*op, duration);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.t1.is_nan() || self.t1 <= 0.0 {
            return Err(SimError::InvalidNoise(format!("t1 must be positive, got {}", self.t1)));
        }
        if self.t2.is_nan() || self.t2 <= 0.0 {
            return Err(SimError::InvalidNoise(format!("t2 must be positive, got {}", self.t2)));
        }
        if self.t2 > 2.0 * self.t1 {
            return Err(SimError::InvalidNoise(format!(
                "t2 ({}) cannot exceed 2 * t1 ({})",
                self.t2, self.t1
            )));
        }
        if self.due_fraction.is_nan() || self.due_fraction <= 0.0 || self.due_fraction > 1.0 {
            return Err(SimError::InvalidNoise(format!(
                "due fraction must be in (0, 1], got {}",
                self.due_fraction
            )));
        }
        if let Some(d) = self.durations.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(SimError::InvalidNoise(format!(
                "op durations must be finite and non-negative, got {d}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn due_threshold(&self) -> f32 {
        self.due_fraction * self.t1.min(self.t2)
    }

    #[must_use]
    pub fn to_noise_params(&self) -> NoiseParams {
        NoiseParams {
            t1: self.t1,
            t2: self.t2,
            due_threshold: self.due_threshold(),
            idle_noise_enabled: 1,
            durations: self.durations,
        }
    }
}
