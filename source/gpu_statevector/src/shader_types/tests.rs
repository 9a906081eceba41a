// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Write;

use expect_test::expect;
use num_complex::Complex32;

use super::{ALL_QUBITS, Op, OpID, ShotData, WorkgroupSums, ops};

fn format_matrix(op: &Op, dim: usize) -> String {
    let mut out = String::new();
    for row in op.dense_matrix(dim).chunks(dim) {
        let cells: Vec<String> = row
            .iter()
            .map(|c| format!("{:+.4}{:+.4}i", c.re, c.im))
            .collect();
        writeln!(out, "[{}]", cells.join(", ")).expect("write to string");
    }
    out
}

#[test]
fn record_sizes_match_shader_layout() {
    assert_eq!(std::mem::size_of::<Op>(), 544);
    assert_eq!(std::mem::size_of::<ShotData>(), 1040);
    assert_eq!(std::mem::size_of::<WorkgroupSums>(), 128);
    assert_eq!(std::mem::offset_of!(ShotData, qubits), 96);
}

#[test]
fn op_ids_round_trip() {
    for raw in (0..=31).chain(128..=130) {
        let id = OpID::try_from(raw).expect("known op id");
        assert_eq!(id.as_u32(), raw);
    }
    assert_eq!(OpID::try_from(32), Err(32));
    assert_eq!(OpID::try_from(127), Err(127));
}

#[test]
fn h_gate_matrix() {
    expect![[r#"
        [+0.7071+0.0000i, +0.7071+0.0000i]
        [+0.7071+0.0000i, -0.7071+0.0000i]
    "#]]
    .assert_eq(&format_matrix(&Op::new_h_gate(3), 2));
}

#[test]
fn sx_gate_matrix() {
    expect![[r#"
        [+0.5000+0.5000i, +0.5000-0.5000i]
        [+0.5000-0.5000i, +0.5000+0.5000i]
    "#]]
    .assert_eq(&format_matrix(&Op::new_sx_gate(0), 2));
}

#[test]
fn t_gate_matrix() {
    expect![[r#"
        [+1.0000+0.0000i, +0.0000+0.0000i]
        [+0.0000+0.0000i, +0.7071+0.7071i]
    "#]]
    .assert_eq(&format_matrix(&Op::new_t_gate(0), 2));
}

#[test]
fn cx_gate_matrix() {
    expect![[r#"
        [+1.0000+0.0000i, +0.0000+0.0000i, +0.0000+0.0000i, +0.0000+0.0000i]
        [+0.0000+0.0000i, +1.0000+0.0000i, +0.0000+0.0000i, +0.0000+0.0000i]
        [+0.0000+0.0000i, +0.0000+0.0000i, +0.0000+0.0000i, +1.0000+0.0000i]
        [+0.0000+0.0000i, +0.0000+0.0000i, +1.0000+0.0000i, +0.0000+0.0000i]
    "#]]
    .assert_eq(&format_matrix(&Op::new_cx_gate(0, 1), 4));
}

#[test]
fn swap_gate_matrix() {
    expect![[r#"
        [+1.0000+0.0000i, +0.0000+0.0000i, +0.0000+0.0000i, +0.0000+0.0000i]
        [+0.0000+0.0000i, +0.0000+0.0000i, +1.0000+0.0000i, +0.0000+0.0000i]
        [+0.0000+0.0000i, +1.0000+0.0000i, +0.0000+0.0000i, +0.0000+0.0000i]
        [+0.0000+0.0000i, +0.0000+0.0000i, +0.0000+0.0000i, +1.0000+0.0000i]
    "#]]
    .assert_eq(&format_matrix(&Op::new_swap_gate(2, 5), 4));
}

#[test]
fn ccx_gate_swaps_last_two_rows() {
    let op = Op::new_ccx_gate(0, 1, 2);
    let m = op.dense_matrix(8);
    assert_eq!(m.len(), 64);
    assert_eq!(Op::new_h_gate(0).dense_matrix(2).len(), 4);
    for row in 0..8 {
        for col in 0..8 {
            let expected = match (row, col) {
                (6, 7) | (7, 6) => 1.0,
                (r, c) if r == c && r < 6 => 1.0,
                _ => 0.0,
            };
            assert_eq!(m[row * 8 + col], Complex32::new(expected, 0.0), "({row}, {col})");
        }
    }
}

#[test]
fn qubits_follow_arity() {
    assert_eq!(Op::new_h_gate(4).qubits(), &[4]);
    assert_eq!(Op::new_mz_gate(2, 7).qubits(), &[2]);
    assert_eq!(Op::new_cx_gate(3, 1).qubits(), &[3, 1]);
    assert_eq!(Op::new_ccx_gate(5, 0, 2).qubits(), &[5, 0, 2]);
    assert!(Op::new_m_every_z_gate().qubits().is_empty());
    assert!(Op::new_parallel_start().qubits().is_empty());
}

#[test]
fn measurement_stores_result_id_in_q2() {
    let op = Op::new_mresetz_gate(3, 9);
    assert_eq!(op.id, ops::MRESETZ);
    assert_eq!((op.q1, op.q2), (3, 9));
    assert!(ops::is_measurement(op.id));
}

#[test]
fn reset_all_targets_every_qubit() {
    let op = Op::new_reset_all();
    assert_eq!(op.id, ops::RESET);
    assert_eq!(op.q1, ALL_QUBITS);
}

#[test]
fn pauli_noise_2q_skips_identity_entry() {
    let mut probabilities = [0.0; 16];
    probabilities[0] = 0.5;
    probabilities[5] = 0.25;
    let op = Op::new_pauli_noise_2q(0, 1, &probabilities);
    assert_eq!(op.matrix[0].re, 0.0);
    assert_eq!(op.matrix[5].re, 0.25);
    assert!(ops::is_noise_op(op.id));
    assert_eq!(ops::arity(op.id), 2);
}

#[test]
fn op_equality_is_bitwise() {
    assert_eq!(Op::new_x_gate(1), Op::new_x_gate(1));
    assert_ne!(Op::new_x_gate(1), Op::new_x_gate(2));
    assert_ne!(Op::new_rx_gate(0.5, 0), Op::new_rx_gate(0.25, 0));
}
