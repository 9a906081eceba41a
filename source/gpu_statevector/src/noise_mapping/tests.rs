// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Write;

use expect_test::expect;

use super::{get_noise_ops, map_program};
use crate::noise_config::{NoiseConfig, NoiseTable};
use crate::shader_types::{Op, OpID, ops};

fn write_mapped(mapped: &[Op], origin: &[usize]) -> String {
    let mut out = String::new();
    for (op, idx) in mapped.iter().zip(origin) {
        let name = OpID::try_from(op.id).map_or_else(|id| format!("#{id}"), |id| format!("{id:?}"));
        writeln!(out, "{idx}: {name} {:?}", op.qubits()).expect("write to string");
    }
    out
}

fn noisy_config() -> NoiseConfig {
    NoiseConfig {
        mz: NoiseTable::pauli(0.1, 0.0, 0.0),
        ..NoiseConfig::uniform(
            &NoiseTable::depolarizing(1, 0.03).with_loss(0.01),
            &NoiseTable::depolarizing(2, 0.15).with_loss(0.02),
        )
    }
}

#[test]
fn noiseless_mapping_drops_identities() {
    let program = [
        Op::new_h_gate(0),
        Op::new_id_gate(1),
        Op::new_move_gate(2),
        Op::new_cx_gate(0, 1),
        Op::new_mz_gate(0, 0),
    ];
    let (mapped, origin) = map_program(&program, None, false, 3);
    expect![[r#"
        0: H [0]
        3: Cx [0, 1]
        4: Mz [0]
    "#]]
    .assert_eq(&write_mapped(&mapped, &origin));
}

#[test]
fn noisy_gates_are_followed_by_their_noise() {
    let program = [
        Op::new_h_gate(0),
        Op::new_cx_gate(0, 1),
        Op::new_mz_gate(1, 0),
    ];
    let config = noisy_config();
    let (mapped, origin) = map_program(&program, Some(&config), false, 3);
    expect![[r#"
        0: H [0]
        0: PauliNoise1Q [0]
        0: LossNoise [0]
        1: Cx [0, 1]
        1: PauliNoise2Q [0, 1]
        1: Id [0]
        1: LossNoise [0]
        1: Id [1]
        1: LossNoise [1]
        2: Id [1]
        2: PauliNoise1Q [1]
        2: Mz [1]
    "#]]
    .assert_eq(&write_mapped(&mapped, &origin));
}

#[test]
fn idle_noise_adds_injection_points() {
    let program = [
        Op::new_x_gate(0),
        Op::new_cx_gate(0, 1),
        Op::new_mz_gate(1, 0),
        Op::new_id_gate(2),
        Op::new_move_gate(0),
    ];
    let (mapped, origin) = map_program(&program, None, true, 3);
    expect![[r#"
        0: X [0]
        1: Id [0]
        1: Id [1]
        1: Cx [0, 1]
        2: Id [1]
        2: Mz [1]
        3: Id [2]
        4: Id [0]
    "#]]
    .assert_eq(&write_mapped(&mapped, &origin));
}

#[test]
fn idle_noise_decays_every_qubit_before_measure_all() {
    let program = [Op::new_x_gate(1), Op::new_m_every_z_gate()];
    let (mapped, origin) = map_program(&program, None, true, 3);
    expect![[r#"
        0: X [1]
        1: Id [0]
        1: Id [1]
        1: Id [2]
        1: MEveryZ []
    "#]]
    .assert_eq(&write_mapped(&mapped, &origin));

    let (mapped, _) = map_program(&program, None, false, 3);
    assert_eq!(mapped, program);
}

#[test]
fn noise_ops_for_noiseless_table_are_none() {
    let config = NoiseConfig::NOISELESS;
    assert!(get_noise_ops(&Op::new_h_gate(0), &config).is_none());

    // Ops without a table never get noise
    let noisy = noisy_config();
    assert!(get_noise_ops(&Op::new_ccx_gate(0, 1, 2), &noisy).is_none());
    assert!(get_noise_ops(&Op::new_parallel_start(), &noisy).is_none());
}

#[test]
fn loss_only_table_adds_just_loss() {
    let config = NoiseConfig {
        x: NoiseTable::noiseless(1).with_loss(0.25),
        ..NoiseConfig::NOISELESS
    };
    let noise_ops = get_noise_ops(&Op::new_x_gate(3), &config).expect("x has loss");
    assert_eq!(noise_ops, vec![Op::new_loss_noise(3, 0.25)]);
}

#[test]
fn pauli_probabilities_reach_the_noise_op() {
    let config = NoiseConfig {
        y: NoiseTable::pauli(0.1, 0.2, 0.3),
        ..NoiseConfig::NOISELESS
    };
    let noise_ops = get_noise_ops(&Op::new_y_gate(1), &config).expect("y has noise");
    assert_eq!(noise_ops, vec![Op::new_pauli_noise_1q(1, 0.1, 0.2, 0.3)]);
    assert_eq!(noise_ops[0].id, ops::PAULI_NOISE_1Q);
}
