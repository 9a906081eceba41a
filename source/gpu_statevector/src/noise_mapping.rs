// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[cfg(test)]
mod tests;

use crate::{
    noise_config::{NoiseConfig, NoiseTable},
    shader_types::{Op, ops},
};

fn get_noise_op(op: &Op, noise_table: &NoiseTable) -> Op {
    let table = noise_table.probability_table();
    match noise_table.qubits {
        1 => Op::new_pauli_noise_1q(op.q1, table[1], table[2], table[3]),
        _ => Op::new_pauli_noise_2q(op.q1, op.q2, &table),
    }
}

fn noise_table_for<'a>(op: &Op, noise_config: &'a NoiseConfig) -> Option<&'a NoiseTable> {
    let noise_table = match op.id {
        ops::ID => &noise_config.i,
        ops::X => &noise_config.x,
        ops::Y => &noise_config.y,
        ops::Z => &noise_config.z,
        ops::H => &noise_config.h,
        ops::S => &noise_config.s,
        ops::S_ADJ => &noise_config.s_adj,
        ops::T => &noise_config.t,
        ops::T_ADJ => &noise_config.t_adj,
        ops::SX => &noise_config.sx,
        ops::SX_ADJ => &noise_config.sx_adj,
        ops::RX => &noise_config.rx,
        ops::RY => &noise_config.ry,
        ops::RZ => &noise_config.rz,
        ops::CX => &noise_config.cx,
        ops::CZ => &noise_config.cz,
        ops::RXX => &noise_config.rxx,
        ops::RYY => &noise_config.ryy,
        ops::RZZ => &noise_config.rzz,
        ops::SWAP => &noise_config.swap,
        ops::MOVE => &noise_config.mov,
        ops::MZ => &noise_config.mz,
        ops::MRESETZ => &noise_config.mresetz,
        _ => return None,
    };
    (!noise_table.is_noiseless()).then_some(noise_table)
}

/// The noise ops that follow `op`, if its table has any noise.
#[must_use]
pub fn get_noise_ops(op: &Op, noise_config: &NoiseConfig) -> Option<Vec<Op>> {
    let noise_table = noise_table_for(op, noise_config)?;
    let mut results = vec![];
    if noise_table.has_pauli_noise() {
        results.push(get_noise_op(op, noise_table));
    }

    if noise_table.loss > 0.0 {
        if ops::is_2q_op(op.id) {
            // For two-qubit gates, doing loss inline is hard, so just append an Id gate with loss for each qubit
            results.push(Op::new_id_gate(op.q1));
            results.push(Op::new_loss_noise(op.q1, noise_table.loss));
            results.push(Op::new_id_gate(op.q2));
            results.push(Op::new_loss_noise(op.q2, noise_table.loss));
        } else {
            results.push(Op::new_loss_noise(op.q1, noise_table.loss));
        }
    }
    Some(results)
}

/// The op stream the kernels run for `program`, and for each op in it the index
/// of the program op it came from.
///
/// With a noise config, each gate is followed by its noise ops, and a noisy
/// measurement becomes an Id carrying the noise followed by the measurement.
/// With idle noise, every multi-qubit op and measurement is preceded by an Id on
/// each of its qubits so decay is applied before it. Measure-all addresses each
/// of the `qubit_count` circuit qubits. `Move` runs as `Id`, and
/// lone `Id` ops are dropped unless idle noise needs them as injection points.
#[must_use]
pub fn map_program(
    program: &[Op],
    noise: Option<&NoiseConfig>,
    idle_noise: bool,
    qubit_count: u32,
) -> (Vec<Op>, Vec<usize>) {
    let mut mapped: Vec<Op> = Vec::with_capacity(program.len() + 1);
    let mut origin: Vec<usize> = Vec::with_capacity(program.len() + 1);

    for (idx, op) in program.iter().enumerate() {
        let mut add_ops: Vec<Op> = vec![*op];
        if let Some(noise_ops) = noise.and_then(|noise| get_noise_ops(op, noise)) {
            add_ops.extend(noise_ops);
        }
        // Noise on a measurement has to happen before it
        if ops::is_measurement(op.id) && add_ops.len() > 1 {
            let measurement = add_ops[0];
            add_ops[0] = Op::new_id_gate(op.q1);
            add_ops.push(measurement);
        }
        if add_ops[0].id == ops::MOVE {
            add_ops[0].id = ops::ID;
        }

        if idle_noise {
            let injection_points: Vec<Op> = if ops::arity(op.id) > 1 {
                op.qubits().iter().map(|q| Op::new_id_gate(*q)).collect()
            } else if ops::is_measurement(op.id) && add_ops[0].id != ops::ID {
                vec![Op::new_id_gate(op.q1)]
            } else if op.id == ops::MEVERYZ {
                (0..qubit_count).map(Op::new_id_gate).collect()
            } else {
                Vec::new()
            };
            add_ops.splice(0..0, injection_points);
        } else if add_ops.len() == 1 && add_ops[0].id == ops::ID {
            // skip lone identity gates
            continue;
        }

        origin.extend(std::iter::repeat_n(idx, add_ops.len()));
        mapped.extend(add_ops);
    }

    (mapped, origin)
}
