// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::error;
use qdk_gpu_statevector::{
    Backend, IdleNoiseConfig, NoiseConfig, NoiseTable, Op, OpID, RunConfig, RunResults,
    run_shots_sync,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Circuit {
    /// H then CX: (|00⟩ + |11⟩)/√2
    Bell,
    /// H then a CX chain over every qubit
    Ghz,
    /// A Bell pair under depolarizing noise with qubit loss
    Noisy,
    /// A GHZ state that decays while idle between gates
    Idle,
}

#[derive(Debug, Parser)]
#[command(name = "gpu-runner", about = "Run demo circuits on the state vector simulator")]
struct Cli {
    #[arg(value_enum, default_value = "bell")]
    circuit: Circuit,

    #[arg(short, long, default_value_t = 2)]
    qubits: u32,

    #[arg(short, long, default_value_t = 10)]
    shots: u32,

    #[arg(long, default_value_t = 0)]
    seed: u32,

    #[arg(long, default_value = "auto")]
    backend: Backend,

    /// Print every shot as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

fn ghz(qubits: u32) -> Vec<Op> {
    let mut program = vec![Op::new_h_gate(0)];
    program.extend((1..qubits).map(|q| Op::new_cx_gate(q - 1, q)));
    program
}

fn with_measurements(mut program: Vec<Op>, qubits: u32) -> Vec<Op> {
    program.extend((0..qubits).map(|q| Op::new_mz_gate(q, q)));
    program
}

fn build(cli: &Cli) -> (Vec<Op>, RunConfig) {
    let qubits = cli.qubits.max(2);
    let config = RunConfig::new(qubits, cli.shots)
        .with_seed(cli.seed)
        .with_backend(cli.backend);
    match cli.circuit {
        Circuit::Bell => (ghz(2), config),
        Circuit::Ghz => (ghz(qubits), config),
        Circuit::Noisy => {
            let one_qubit = NoiseTable::depolarizing(1, 0.01).with_loss(0.005);
            let two_qubit = NoiseTable::depolarizing(2, 0.02);
            (
                with_measurements(ghz(2), 2),
                config
                    .with_result_count(2)
                    .with_noise(NoiseConfig::uniform(&one_qubit, &two_qubit)),
            )
        }
        Circuit::Idle => {
            let idle = IdleNoiseConfig::new(50.0, 70.0)
                .with_durations(&[OpID::H, OpID::X, OpID::Id], 1.0)
                .with_duration(OpID::Cx, 2.0);
            (
                with_measurements(ghz(qubits), qubits),
                config.with_result_count(qubits).with_idle_noise(idle),
            )
        }
    }
}

/// Basis state ket with one digit per qubit, qubit 0 rightmost
fn basis_label(entry_idx: u32, qubits: usize) -> String {
    format!("|{entry_idx:0qubits$b}⟩")
}

fn print_summary(results: &RunResults, qubits: usize) {
    println!("Ran {} shots on {}", results.shots.len(), results.device);
    for (entry_idx, probability) in results.aggregate_probabilities() {
        println!("  {}: {probability:.4}", basis_label(entry_idx, qubits));
    }
    for shot in results.shots.iter().filter(|shot| !shot.measurements.is_empty()) {
        println!("  shot {}: {:?}", shot.shot_id, shot.measurements);
    }
    let failed = results.failed_shots().len();
    if failed > 0 {
        println!("  {failed} shots failed");
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let (program, config) = build(&cli);

    let results = match run_shots_sync(&program, &config) {
        Ok(results) => results,
        Err(e) => {
            error!("run failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("could not serialize results: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_summary(&results, config.qubit_count as usize);
    }

    if results.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::basis_label;

    #[test]
    fn basis_labels_pad_to_qubit_count() {
        assert_eq!(basis_label(0, 2), "|00⟩");
        assert_eq!(basis_label(0b11, 2), "|11⟩");
        assert_eq!(basis_label(0b10, 4), "|0010⟩");
    }
}
