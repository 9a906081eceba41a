// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(dead_code)]

use std::{f32::consts::PI, fmt::Write};

use expect_test::expect;

use super::{Backend, GpuContext, RunConfig, RunParams, RunResults};
use crate::error::{ShotStatus, SimError};
use crate::noise_config::{IdleNoiseConfig, NoiseConfig, NoiseTable};
use crate::run_shots_sync;
use crate::shader_types::{MAX_CIRCUIT_OPS, Op, OpID, RESULT_LOST, ResultRecord, SIZEOF_SHOTDATA};

/// Every basis state with its probability, qubit 0 leftmost. Only usable for
/// small circuits since it lists all states.
fn write_probabilities(num_qubits: u32, records: &[ResultRecord]) -> String {
    let mut prob_str = String::new();
    writeln!(&mut prob_str, "Probabilities:").expect("failed to write");
    let mut formatted_results: Vec<(String, f32)> = (0..(1u32 << num_qubits))
        .map(|i| {
            let bits = format!("{:0width$b}", i, width = num_qubits as usize)
                .chars()
                .rev()
                .collect::<String>();
            let probability = records
                .iter()
                .find(|record| record.entry_idx == i)
                .map_or(0.0, |record| record.probability);
            (bits, probability)
        })
        .collect();
    formatted_results.sort_by(|a, b| a.0.cmp(&b.0));
    for (bits, prob) in formatted_results {
        writeln!(prob_str, "|{bits}⟩: {prob:.6}").expect("failed to write");
    }
    prob_str
}

fn cpu_config(qubits: u32, shots: u32) -> RunConfig {
    RunConfig::new(qubits, shots).with_backend(Backend::Cpu)
}

fn run(qubits: u32, program: &[Op]) -> RunResults {
    run_shots_sync(program, &cpu_config(qubits, 1)).expect("run should succeed")
}

fn probabilities(qubits: u32, program: &[Op]) -> String {
    let results = run(qubits, program);
    assert!(results.success);
    write_probabilities(qubits, &results.shots[0].records)
}

fn error_message(result: crate::error::Result<()>) -> String {
    result.expect_err("expected an error").to_string()
}

#[test]
fn x_gate() {
    expect![[r#"
        Probabilities:
        |00⟩: 0.000000
        |01⟩: 0.000000
        |10⟩: 1.000000
        |11⟩: 0.000000
    "#]]
    .assert_eq(&probabilities(2, &[Op::new_x_gate(0)]));
}

#[test]
fn h_gate() {
    expect![[r#"
        Probabilities:
        |00⟩: 0.500000
        |01⟩: 0.500000
        |10⟩: 0.000000
        |11⟩: 0.000000
    "#]]
    .assert_eq(&probabilities(2, &[Op::new_h_gate(1)]));
}

#[test]
fn bell() {
    expect![[r#"
        Probabilities:
        |00⟩: 0.500000
        |01⟩: 0.000000
        |10⟩: 0.000000
        |11⟩: 0.500000
    "#]]
    .assert_eq(&probabilities(
        2,
        &[Op::new_h_gate(0), Op::new_cx_gate(0, 1)],
    ));
}

#[test]
fn sx_sxadj() {
    expect![[r#"
        Probabilities:
        |00⟩: 1.000000
        |01⟩: 0.000000
        |10⟩: 0.000000
        |11⟩: 0.000000
    "#]]
    .assert_eq(&probabilities(
        2,
        &[Op::new_sx_gate(0), Op::new_sx_adj_gate(0)],
    ));
}

#[test]
fn rx_half_turn() {
    expect![[r#"
        Probabilities:
        |0⟩: 0.500000
        |1⟩: 0.500000
    "#]]
    .assert_eq(&probabilities(1, &[Op::new_rx_gate(PI / 2.0, 0)]));
}

#[test]
fn ccx() {
    expect![[r#"
        Probabilities:
        |000⟩: 0.000000
        |001⟩: 0.000000
        |010⟩: 0.000000
        |011⟩: 0.000000
        |100⟩: 0.000000
        |101⟩: 0.000000
        |110⟩: 0.000000
        |111⟩: 1.000000
    "#]]
    .assert_eq(&probabilities(
        3,
        &[
            Op::new_x_gate(0),
            Op::new_x_gate(1),
            Op::new_ccx_gate(0, 1, 2),
        ],
    ));
}

#[test]
fn swap_moves_excitation() {
    expect![[r#"
        Probabilities:
        |000⟩: 0.000000
        |001⟩: 1.000000
        |010⟩: 0.000000
        |011⟩: 0.000000
        |100⟩: 0.000000
        |101⟩: 0.000000
        |110⟩: 0.000000
        |111⟩: 0.000000
    "#]]
    .assert_eq(&probabilities(
        3,
        &[Op::new_x_gate(0), Op::new_swap_gate(0, 2)],
    ));
}

#[test]
fn config_validation() {
    expect!["qubit count 0 is outside the supported range 1..=27"]
        .assert_eq(&error_message(RunConfig::new(0, 1).validate()));
    expect!["qubit count 28 is outside the supported range 1..=27"]
        .assert_eq(&error_message(RunConfig::new(28, 1).validate()));
    expect!["shot count must be at least 1"]
        .assert_eq(&error_message(RunConfig::new(2, 0).validate()));
    expect!["result threshold 1 must be finite and in the range [0, 1)"].assert_eq(
        &error_message(RunConfig::new(2, 1).with_result_threshold(1.0).validate()),
    );
    expect!["invalid run configuration: results_per_shot must be at least 1"].assert_eq(
        &error_message(RunConfig::new(2, 1).with_results_per_shot(0).validate()),
    );
    expect!["invalid run configuration: max_qubits_per_workgroup must be in 8..=12, got 13"]
        .assert_eq(&error_message(
            RunConfig::new(2, 1)
                .with_max_qubits_per_workgroup(13)
                .validate(),
        ));
    assert!(RunConfig::new(27, 1).validate().is_ok());
}

#[test]
fn program_validation() {
    let config = RunConfig::new(2, 1).with_result_count(2);
    expect!["no program has been set"].assert_eq(&error_message(config.validate_program(&[])));
    expect!["op 0 addresses qubit 3 but the circuit only has 2 qubits"]
        .assert_eq(&error_message(config.validate_program(&[Op::new_x_gate(3)])));
    expect!["op 1 uses qubit 1 more than once"].assert_eq(&error_message(
        config.validate_program(&[Op::new_x_gate(0), Op::new_cx_gate(1, 1)]),
    ));
    expect!["op 0 writes result 4 but only 2 results are allocated"]
        .assert_eq(&error_message(config.validate_program(&[Op::new_mz_gate(0, 4)])));

    // Unknown opcodes are reported per shot at run time
    let unknown = Op {
        id: 77,
        ..Op::default()
    };
    assert!(config.validate_program(&[unknown]).is_ok());
}

#[test]
fn invalid_program_is_rejected_before_running() {
    let err = run_shots_sync(&[Op::new_x_gate(5)], &cpu_config(2, 1))
        .expect_err("qubit 5 is out of range");
    assert_eq!(
        err,
        SimError::QubitOutOfRange {
            op_idx: 0,
            qubit: 5,
            qubit_count: 2
        }
    );
}

#[test]
fn small_runs_fit_in_one_batch() {
    let params = RunParams::new(&RunConfig::new(3, 10).with_result_count(4), 5)
        .expect("params should be valid");
    assert_eq!(params.shots_per_batch, 10);
    assert_eq!(params.batch_count, 1);
    assert_eq!(params.op_count, 5);
    assert_eq!(params.layout.qubit_count, 10);
    assert_eq!(params.shots_buffer_size, 10 * SIZEOF_SHOTDATA);
    assert_eq!(params.sums_buffer_size, 10 * 128);
    assert_eq!(params.measurements_buffer_size, 10 * 4 * 4);
    assert_eq!(params.results_buffer_size, 10 * 256 * 8);
}

#[test]
fn large_states_are_split_into_batches() {
    let params =
        RunParams::new(&RunConfig::new(20, 1000), 50).expect("params should be valid");
    assert_eq!(params.layout.workgroups_per_shot, 256);
    // 8 MiB per shot in a 1 GiB buffer
    assert_eq!(params.shots_per_batch, 128);
    assert_eq!(params.batch_count, 8);
    assert_eq!(params.state_vector_buffer_size, 1 << 30);
}

#[test]
fn dispatch_width_limits_batches() {
    let params = RunParams::new(
        &RunConfig::new(16, 1000).with_max_qubits_per_workgroup(8),
        10,
    )
    .expect("params should be valid");
    // 256 workgroups per shot, 65535 workgroups per dispatch
    assert_eq!(params.shots_per_batch, 255);
    assert_eq!(params.batch_count, 4);

    let too_wide = RunParams::new(
        &RunConfig::new(27, 1).with_max_qubits_per_workgroup(8),
        10,
    )
    .expect_err("too many workgroups per shot");
    expect!["invalid run configuration: 524288 workgroups per shot exceed the dispatch limit of 65535"]
        .assert_eq(&too_wide.to_string());
}

#[test]
fn oversized_program_is_rejected() {
    let err = RunParams::new(&RunConfig::new(2, 1), MAX_CIRCUIT_OPS + 1)
        .expect_err("program should not fit");
    assert_eq!(err, SimError::ProgramTooLarge(MAX_CIRCUIT_OPS + 1));
}

#[test]
fn unsupported_op_fails_every_shot() {
    let unknown = Op {
        id: 99,
        ..Op::default()
    };
    let program = [Op::new_h_gate(0), unknown, Op::new_x_gate(0)];
    let results =
        run_shots_sync(&program, &cpu_config(1, 3)).expect("run should complete");
    assert!(!results.success);
    assert_eq!(results.failed_shots().len(), 3);
    for shot in &results.shots {
        assert_eq!(
            shot.status,
            ShotStatus::UnsupportedOperation {
                op_idx: 1,
                opcode: 99
            }
        );
        // A failed shot stops before reporting probabilities
        assert!(shot.records.is_empty());
    }
    assert!(results.aggregate_probabilities().is_empty());
}

#[test]
fn injected_opcode_in_program_is_unsupported() {
    let program = [Op::new_x_gate(0), Op::new_injected_op(0, 1, 2)];
    let results =
        run_shots_sync(&program, &cpu_config(3, 2)).expect("run should complete");
    for shot in &results.shots {
        assert_eq!(
            shot.status,
            ShotStatus::UnsupportedOperation {
                op_idx: 1,
                opcode: OpID::Injected.as_u32()
            }
        );
    }
}

#[test]
fn shots_report_their_ids() {
    let results =
        run_shots_sync(&[Op::new_h_gate(0)], &cpu_config(1, 5)).expect("run should succeed");
    let ids: Vec<u32> = results.shots.iter().map(|shot| shot.shot_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn aggregate_probabilities_average_shots() {
    let results = run_shots_sync(
        &[Op::new_h_gate(0), Op::new_cx_gate(0, 1)],
        &cpu_config(2, 4),
    )
    .expect("run should succeed");
    let aggregate = results.aggregate_probabilities();
    assert_eq!(aggregate.keys().copied().collect::<Vec<_>>(), vec![0, 3]);
    for probability in aggregate.values() {
        assert!((probability - 0.5).abs() < 1e-5);
    }
}

#[test]
fn records_past_capacity_are_dropped_and_counted() {
    let program = [Op::new_h_gate(0), Op::new_h_gate(1), Op::new_h_gate(2)];
    let results = run_shots_sync(&program, &cpu_config(3, 1).with_results_per_shot(2))
        .expect("run should succeed");
    let shot = &results.shots[0];
    assert_eq!(shot.records.len(), 2);
    assert_eq!(shot.dropped_records, 6);
    assert_eq!(results.truncated_shots().len(), 1);
    // Truncation is not a failure
    assert!(results.success);
}

#[test]
fn threshold_hides_small_probabilities() {
    // Ry(0.2) leaves about 1% in |1⟩
    let program = [Op::new_ry_gate(0.2, 0)];
    let results = run_shots_sync(&program, &cpu_config(1, 1).with_result_threshold(0.05))
        .expect("run should succeed");
    let entries: Vec<u32> = results.shots[0]
        .records
        .iter()
        .map(|record| record.entry_idx)
        .collect();
    assert_eq!(entries, vec![0]);
}

#[test]
fn measurements_follow_quantum_statistics() {
    let program = [Op::new_h_gate(0), Op::new_mz_gate(0, 0)];
    let results = run_shots_sync(&program, &cpu_config(1, 400).with_result_count(1).with_seed(11))
        .expect("run should succeed");
    let ones = results
        .shots
        .iter()
        .filter(|shot| shot.measurements == [1])
        .count();
    assert!((120..=280).contains(&ones), "{ones} ones out of 400");

    // The reported state agrees with the measurement
    for shot in &results.shots {
        assert_eq!(shot.records.len(), 1);
        assert_eq!(shot.records[0].entry_idx, shot.measurements[0]);
    }
}

#[test]
fn bell_measurements_agree() {
    let program = [
        Op::new_h_gate(0),
        Op::new_cx_gate(0, 1),
        Op::new_mz_gate(0, 0),
        Op::new_mz_gate(1, 1),
    ];
    let results = run_shots_sync(&program, &cpu_config(2, 50).with_result_count(2))
        .expect("run should succeed");
    for shot in &results.shots {
        assert_eq!(shot.measurements[0], shot.measurements[1]);
    }
}

fn pauli_x_noise() -> NoiseConfig {
    NoiseConfig {
        x: NoiseTable::pauli(0.5, 0.0, 0.0),
        ..NoiseConfig::NOISELESS
    }
}

#[test]
fn noisy_shots_are_independent() {
    let program = [Op::new_x_gate(0), Op::new_mz_gate(0, 0)];
    let config = cpu_config(1, 200)
        .with_result_count(1)
        .with_seed(3)
        .with_noise(pauli_x_noise());
    let results = run_shots_sync(&program, &config).expect("run should succeed");
    let ones = results
        .shots
        .iter()
        .filter(|shot| shot.measurements == [1])
        .count();
    assert!((40..=160).contains(&ones), "{ones} ones out of 200");

    for shot in &results.shots {
        assert!(!shot.records.is_empty());
        assert!(shot.records.iter().all(|record| record.probability >= 0.0));
        let total: f32 = shot.records.iter().map(|record| record.probability).sum();
        assert!(total <= 1.0 + 1e-5, "shot {} sums to {total}", shot.shot_id);
    }
}

#[test]
fn noisy_entangled_shots_report_valid_probabilities() {
    let config = cpu_config(3, 64).with_seed(11).with_noise(NoiseConfig::uniform(
        &NoiseTable::depolarizing(1, 0.1),
        &NoiseTable::depolarizing(2, 0.2),
    ));
    let program = [
        Op::new_h_gate(0),
        Op::new_cx_gate(0, 1),
        Op::new_rx_gate(0.7, 2),
        Op::new_cx_gate(1, 2),
    ];
    let results = run_shots_sync(&program, &config).expect("run should succeed");
    assert!(results.success);
    for shot in &results.shots {
        assert!(shot.records.iter().all(|record| record.probability >= 0.0));
        let total: f32 = shot.records.iter().map(|record| record.probability).sum();
        assert!(total <= 1.0 + 1e-5, "shot {} sums to {total}", shot.shot_id);
        assert!(total > 0.99, "shot {} sums to {total}", shot.shot_id);
    }
}

#[test]
fn same_seed_repeats_the_run() {
    let program = [Op::new_h_gate(0), Op::new_x_gate(1), Op::new_mz_gate(0, 0)];
    let config = cpu_config(2, 32)
        .with_result_count(1)
        .with_seed(42)
        .with_noise(pauli_x_noise());
    let first = run_shots_sync(&program, &config).expect("run should succeed");
    let second = run_shots_sync(&program, &config).expect("run should succeed");
    assert_eq!(first.shots, second.shots);

    let other = run_shots_sync(&program, &config.clone().with_seed(43))
        .expect("run should succeed");
    assert_ne!(first.shots, other.shots);
}

#[test]
fn certain_loss_marks_measurement_lost() {
    let config = cpu_config(2, 4).with_result_count(2).with_noise(NoiseConfig {
        x: NoiseTable::noiseless(1).with_loss(1.0),
        ..NoiseConfig::NOISELESS
    });
    let program = [
        Op::new_x_gate(0),
        Op::new_mz_gate(0, 0),
        Op::new_mz_gate(1, 1),
    ];
    let results = run_shots_sync(&program, &config).expect("run should succeed");
    for shot in &results.shots {
        assert_eq!(shot.measurements, vec![RESULT_LOST, 0]);
        assert_eq!(shot.records.len(), 1);
        assert_eq!(shot.records[0].entry_idx, 0);
    }
}

#[test]
fn idle_noise_tracks_time() {
    let idle = IdleNoiseConfig::new(1000.0, 1000.0)
        .with_duration(OpID::X, 1.0)
        .with_duration(OpID::Cx, 2.0);
    let program = [Op::new_x_gate(0), Op::new_cx_gate(0, 1), Op::new_x_gate(1)];
    let results = run_shots_sync(&program, &cpu_config(3, 2).with_idle_noise(idle))
        .expect("run should succeed");
    for shot in &results.shots {
        assert_eq!(shot.elapsed, 4.0);
        assert_eq!(shot.qubit_heat, vec![3.0, 3.0, 0.0]);
    }
}

#[test]
fn parallel_region_takes_its_longest_op() {
    let idle = IdleNoiseConfig::new(1000.0, 1000.0)
        .with_duration(OpID::X, 1.0)
        .with_duration(OpID::Cx, 2.0);
    let program = [
        Op::new_parallel_start(),
        Op::new_x_gate(0),
        Op::new_cx_gate(1, 2),
        Op::new_parallel_end(),
        Op::new_x_gate(0),
    ];
    let results = run_shots_sync(&program, &cpu_config(3, 1).with_idle_noise(idle))
        .expect("run should succeed");
    let shot = &results.shots[0];
    assert_eq!(shot.elapsed, 3.0);
    assert_eq!(shot.qubit_heat, vec![3.0, 2.0, 2.0]);
}

#[test]
fn strong_idle_decay_relaxes_waiting_qubit() {
    // q0 waits while q1 is busy, then relaxes fully before its next gate
    let idle = IdleNoiseConfig::new(0.001, 0.001)
        .with_duration(OpID::X, 1.0)
        .with_due_fraction(1.0);
    let program = [Op::new_x_gate(0), Op::new_x_gate(1), Op::new_id_gate(0)];
    let results = run_shots_sync(&program, &cpu_config(2, 8).with_idle_noise(idle))
        .expect("run should succeed");
    for shot in &results.shots {
        assert_eq!(shot.records.len(), 1);
        assert_eq!(shot.records[0].entry_idx, 0b10);
    }
}

#[test]
fn idle_decay_applies_before_final_report() {
    // q0 is never touched again after its X, so only the report can relax it
    let idle = IdleNoiseConfig::new(0.001, 0.001)
        .with_duration(OpID::X, 1.0)
        .with_due_fraction(1.0);
    let program = [Op::new_x_gate(0), Op::new_x_gate(1)];
    let results = run_shots_sync(&program, &cpu_config(2, 4).with_idle_noise(idle.clone()))
        .expect("run should succeed");
    for shot in &results.shots {
        assert_eq!(shot.records.len(), 1);
        assert_eq!(shot.records[0].entry_idx, 0b10);
    }

    let explicit = [Op::new_x_gate(0), Op::new_x_gate(1), Op::new_m_every_z_gate()];
    let results = run_shots_sync(&explicit, &cpu_config(2, 4).with_idle_noise(idle))
        .expect("run should succeed");
    for shot in &results.shots {
        assert_eq!(shot.records[0].entry_idx, 0b10);
    }
}

#[test]
fn captured_state_has_circuit_size() {
    let results = run_shots_sync(
        &[Op::new_h_gate(0)],
        &cpu_config(3, 2).with_capture_state(true),
    )
    .expect("run should succeed");
    let vectors = results.state_vectors.expect("state was captured");
    assert_eq!(vectors.len(), 2);
    for vector in vectors {
        assert_eq!(vector.len(), 8);
        assert!((vector[0].re - vector[1].re).abs() < 1e-6);
    }
}

fn wide_program() -> Vec<Op> {
    vec![
        Op::new_h_gate(0),
        Op::new_h_gate(5),
        Op::new_h_gate(11),
        Op::new_cx_gate(0, 9),
        Op::new_cx_gate(11, 1),
        Op::new_rx_gate(0.4, 10),
        Op::new_ry_gate(1.3, 3),
        Op::new_rzz_gate(0.9, 2, 11),
        Op::new_ccx_gate(0, 5, 8),
        Op::new_ccx_gate(11, 10, 4),
        Op::new_t_gate(9),
        Op::new_s_gate(10),
        Op::new_swap_gate(1, 10),
        Op::new_rxx_gate(0.6, 7, 8),
        Op::new_ryy_gate(0.2, 6, 11),
        Op::new_sx_gate(2),
        Op::new_cz_gate(3, 10),
        Op::new_y_gate(11),
        Op::new_h_gate(8),
        Op::new_cx_gate(8, 0),
    ]
}

#[test]
fn workgroup_size_does_not_change_the_state() {
    let program = wide_program();
    let run_with = |qubits_per_workgroup: u32| {
        run_shots_sync(
            &program,
            &cpu_config(12, 1)
                .with_capture_state(true)
                .with_max_qubits_per_workgroup(qubits_per_workgroup),
        )
        .expect("run should succeed")
        .state_vectors
        .expect("state was captured")
    };
    let whole = run_with(12);
    assert_eq!(whole, run_with(10));
    assert_eq!(whole, run_with(8));
}

#[test]
fn context_reuses_program_across_configs() {
    let mut context = GpuContext::new(cpu_config(1, 1));
    context.set_program(&[Op::new_x_gate(0)]);
    let first = context.run_shots_sync().expect("run should succeed");
    assert_eq!(first.shots[0].records[0].entry_idx, 1);

    context.set_noise_config(NoiseConfig {
        x: NoiseTable::pauli(1.0, 0.0, 0.0),
        ..NoiseConfig::NOISELESS
    });
    let noisy = context.run_shots_sync().expect("run should succeed");
    // The certain X error undoes the gate
    assert_eq!(noisy.shots[0].records[0].entry_idx, 0);
}

#[test]
fn backend_names_parse() {
    assert_eq!("CPU".parse::<Backend>(), Ok(Backend::Cpu));
    assert_eq!("gpu".parse::<Backend>(), Ok(Backend::Gpu));
    assert_eq!("auto".parse::<Backend>(), Ok(Backend::Auto));
    expect!["unknown backend `tpu`, expected auto, cpu or gpu"]
        .assert_eq(&"tpu".parse::<Backend>().expect_err("not a backend"));
    assert_eq!(Backend::Gpu.to_string(), "gpu");
}

#[test]
fn shot_results_serialize() {
    let results = run(1, &[Op::new_x_gate(0)]);
    let json = serde_json::to_string(&results.shots[0]).expect("serializes");
    expect![[r#"{"shot_id":0,"status":{"status":"ok"},"records":[{"entry_idx":1,"probability":1.0}],"dropped_records":0,"measurements":[],"elapsed":0.0,"qubit_heat":[0.0]}"#]]
        .assert_eq(&json);
}

#[test]
fn gpu_matches_cpu() {
    if GpuContext::try_create_adapter().is_err() {
        // No adapter on this machine
        return;
    }
    let program = wide_program();
    let config = RunConfig::new(12, 4).with_seed(5);
    let cpu = run_shots_sync(&program, &config.clone().with_backend(Backend::Cpu))
        .expect("cpu run should succeed");
    let gpu = run_shots_sync(&program, &config.with_backend(Backend::Gpu))
        .expect("gpu run should succeed");

    let cpu_probabilities = cpu.aggregate_probabilities();
    let gpu_probabilities = gpu.aggregate_probabilities();
    for (entry_idx, probability) in &cpu_probabilities {
        let on_gpu = gpu_probabilities.get(entry_idx).copied().unwrap_or_default();
        assert!(
            (probability - on_gpu).abs() < 1e-4,
            "entry {entry_idx}: cpu {probability}, gpu {on_gpu}"
        );
    }
}
