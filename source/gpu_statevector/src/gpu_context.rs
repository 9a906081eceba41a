// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[cfg(test)]
mod tests;

use std::cmp::min;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use num_complex::Complex32;
use serde::Serialize;

use crate::cpu_grid::CpuGrid;
use crate::device::{BatchOutput, ComputeDevice};
use crate::error::{Result, ShotStatus, SimError};
use crate::gpu_resources::GpuResources;
use crate::kernels::ShotLayout;
use crate::noise_config::{IdleNoiseConfig, NoiseConfig};
use crate::noise_mapping::map_program;
use crate::shader_types::{
    ALL_QUBITS, MAX_BUFFER_SIZE, MAX_CIRCUIT_OPS, MAX_QUBIT_COUNT, MAX_QUBITS_PER_WORKGROUP,
    MAX_WORKGROUPS_PER_DIMENSION, NoiseParams, Op, OpID, ResultRecord, SIZEOF_SHOTDATA, Uniforms,
    WorkgroupSums, ops,
};

// On Windows, running larger circuits/shots can hit TDR issues if too many ops are dispatched in one go.
const DEFAULT_MAX_OPS_PER_DISPATCH: usize = 16;

/// Fewest qubits a workgroup may own; keeps at least eight amplitudes per thread.
pub const MIN_QUBITS_PER_WORKGROUP: u32 = 8;

pub const DEFAULT_RESULT_THRESHOLD: f32 = 1e-6;
pub const DEFAULT_RESULTS_PER_SHOT: u32 = 256;

/// Where the kernels run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The GPU when a suitable adapter exists, otherwise the CPU grid.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(format!("unknown backend `{other}`, expected auto, cpu or gpu")),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

/// Everything about a run except the program.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub qubit_count: u32,
    pub shot_count: u32,
    pub seed: u32,
    /// Basis states with probability strictly above this are reported.
    pub result_threshold: f32,
    /// Capacity of each shot's results region; records past it are dropped.
    pub results_per_shot: u32,
    /// Measurement result slots per shot, addressed by Mz and MResetZ.
    pub result_count: u32,
    pub noise: Option<NoiseConfig>,
    pub idle_noise: Option<IdleNoiseConfig>,
    pub max_qubits_per_workgroup: u32,
    /// Return each shot's amplitudes after the run.
    pub capture_state: bool,
    pub backend: Backend,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            qubit_count: 1,
            shot_count: 1,
            seed: 0,
            result_threshold: DEFAULT_RESULT_THRESHOLD,
            results_per_shot: DEFAULT_RESULTS_PER_SHOT,
            result_count: 0,
            noise: None,
            idle_noise: None,
            max_qubits_per_workgroup: MAX_QUBITS_PER_WORKGROUP,
            capture_state: false,
            backend: Backend::Auto,
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn new(qubit_count: u32, shot_count: u32) -> Self {
        Self {
            qubit_count,
            shot_count,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_result_threshold(mut self, threshold: f32) -> Self {
        self.result_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_results_per_shot(mut self, results_per_shot: u32) -> Self {
        self.results_per_shot = results_per_shot;
        self
    }

    #[must_use]
    pub fn with_result_count(mut self, result_count: u32) -> Self {
        self.result_count = result_count;
        self
    }

    #[must_use]
    pub fn with_noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = Some(noise);
        self
    }

    #[must_use]
    pub fn with_idle_noise(mut self, idle_noise: IdleNoiseConfig) -> Self {
        self.idle_noise = Some(idle_noise);
        self
    }

    #[must_use]
    pub fn with_max_qubits_per_workgroup(mut self, qubits: u32) -> Self {
        self.max_qubits_per_workgroup = qubits;
        self
    }

    #[must_use]
    pub fn with_capture_state(mut self, capture_state: bool) -> Self {
        self.capture_state = capture_state;
        self
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.qubit_count == 0 || self.qubit_count > MAX_QUBIT_COUNT {
            return Err(SimError::QubitCount(self.qubit_count));
        }
        if self.shot_count == 0 {
            return Err(SimError::NoShots);
        }
        if !self.result_threshold.is_finite() || !(0.0..1.0).contains(&self.result_threshold) {
            return Err(SimError::InvalidThreshold(self.result_threshold));
        }
        if self.results_per_shot == 0 {
            return Err(SimError::InvalidConfig(
                "results_per_shot must be at least 1".to_string(),
            ));
        }
        if !(MIN_QUBITS_PER_WORKGROUP..=MAX_QUBITS_PER_WORKGROUP)
            .contains(&self.max_qubits_per_workgroup)
        {
            return Err(SimError::InvalidConfig(format!(
                "max_qubits_per_workgroup must be in {MIN_QUBITS_PER_WORKGROUP}..={MAX_QUBITS_PER_WORKGROUP}, got {}",
                self.max_qubits_per_workgroup
            )));
        }
        if let Some(noise) = &self.noise {
            noise.validate()?;
        }
        if let Some(idle_noise) = &self.idle_noise {
            idle_noise.validate()?;
        }
        Ok(())
    }

    /// Check every op against the circuit before anything is dispatched.
    /// Unknown opcodes are left for the kernels to report per shot.
    pub fn validate_program(&self, program: &[Op]) -> Result<()> {
        if program.is_empty() {
            return Err(SimError::EmptyProgram);
        }
        for (op_idx, op) in program.iter().enumerate() {
            if OpID::try_from(op.id).is_err() || (op.id == ops::RESET && op.q1 == ALL_QUBITS) {
                continue;
            }
            let qubits = op.qubits();
            for (i, qubit) in qubits.iter().enumerate() {
                if *qubit >= self.qubit_count {
                    return Err(SimError::QubitOutOfRange {
                        op_idx,
                        qubit: *qubit,
                        qubit_count: self.qubit_count,
                    });
                }
                if qubits[..i].contains(qubit) {
                    return Err(SimError::DuplicateQubit {
                        op_idx,
                        qubit: *qubit,
                    });
                }
            }
            if ops::is_measurement(op.id) && op.q2 >= self.result_count {
                return Err(SimError::ResultOutOfRange {
                    op_idx,
                    result_id: op.q2,
                    result_count: self.result_count,
                });
            }
        }
        Ok(())
    }
}

/// Sizes and partitioning for one run, derived from the config and program.
#[derive(Clone, Debug, PartialEq)]
pub struct RunParams {
    pub circuit_qubits: u32,
    pub layout: ShotLayout,
    pub result_count: u32,
    pub results_per_shot: u32,
    pub shot_count: u32,
    pub shots_per_batch: u32,
    pub batch_count: u32,
    pub op_count: u32,
    pub shots_buffer_size: usize,
    pub state_vector_buffer_size: usize,
    pub sums_buffer_size: usize,
    pub results_buffer_size: usize,
    pub cursors_buffer_size: usize,
    pub measurements_buffer_size: usize,
}

impl RunParams {
    pub fn new(config: &RunConfig, op_count: usize) -> Result<Self> {
        let layout = ShotLayout::new(config.qubit_count, config.max_qubits_per_workgroup);
        let state_vector_size_per_shot = layout.entries_per_shot() * std::mem::size_of::<Complex32>();
        let results_size_per_shot =
            config.results_per_shot as usize * std::mem::size_of::<ResultRecord>();
        let measurements_per_shot = config.result_count.max(1) as usize;

        if state_vector_size_per_shot > MAX_BUFFER_SIZE {
            return Err(SimError::BufferTooLarge {
                what: "state vector",
                size: state_vector_size_per_shot,
            });
        }
        if results_size_per_shot > MAX_BUFFER_SIZE {
            return Err(SimError::BufferTooLarge {
                what: "results",
                size: results_size_per_shot,
            });
        }
        if layout.workgroups_per_shot > MAX_WORKGROUPS_PER_DIMENSION {
            return Err(SimError::InvalidConfig(format!(
                "{} workgroups per shot exceed the dispatch limit of {MAX_WORKGROUPS_PER_DIMENSION}",
                layout.workgroups_per_shot
            )));
        }
        let op_count = u32::try_from(op_count)
            .ok()
            .filter(|count| (*count as usize) <= MAX_CIRCUIT_OPS)
            .ok_or(SimError::ProgramTooLarge(op_count))?;

        // How many shots fit in the buffers, and in one dimension of an Execute dispatch
        let max_shots_in_buffer = min(
            MAX_BUFFER_SIZE / state_vector_size_per_shot,
            MAX_BUFFER_SIZE / results_size_per_shot,
        );
        let max_shots_per_dispatch = MAX_WORKGROUPS_PER_DIMENSION / layout.workgroups_per_shot;
        let shots_per_batch = min(
            config.shot_count,
            min(
                u32::try_from(max_shots_in_buffer).unwrap_or(u32::MAX),
                max_shots_per_dispatch,
            ),
        )
        .max(1);
        let batch_count = config.shot_count.div_ceil(shots_per_batch);

        let shots = shots_per_batch as usize;
        Ok(Self {
            circuit_qubits: config.qubit_count,
            layout,
            result_count: config.result_count,
            results_per_shot: config.results_per_shot,
            shot_count: config.shot_count,
            shots_per_batch,
            batch_count,
            op_count,
            shots_buffer_size: shots * SIZEOF_SHOTDATA,
            state_vector_buffer_size: shots * state_vector_size_per_shot,
            sums_buffer_size: shots
                * layout.workgroups_per_shot as usize
                * std::mem::size_of::<WorkgroupSums>(),
            results_buffer_size: shots * results_size_per_shot,
            cursors_buffer_size: shots * std::mem::size_of::<u32>(),
            measurements_buffer_size: shots * measurements_per_shot * std::mem::size_of::<u32>(),
        })
    }
}

/// What one shot produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShotResult {
    pub shot_id: u32,
    pub status: ShotStatus,
    /// Basis states above the threshold, sorted by basis index.
    pub records: Vec<ResultRecord>,
    /// Records that did not fit in the shot's results region.
    pub dropped_records: u32,
    /// One entry per result slot: 0, 1, or `RESULT_LOST`.
    pub measurements: Vec<u32>,
    /// Total duration of the shot's ops.
    pub elapsed: f32,
    /// Busy time of each circuit qubit.
    pub qubit_heat: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunResults {
    pub shots: Vec<ShotResult>,
    /// The first 2^N amplitudes of each shot, when state capture was requested.
    #[serde(skip)]
    pub state_vectors: Option<Vec<Vec<Complex32>>>,
    pub success: bool,
    pub device: String,
}

impl RunResults {
    /// Mean probability of each reported basis state over the shots that succeeded.
    #[must_use]
    pub fn aggregate_probabilities(&self) -> BTreeMap<u32, f64> {
        let mut totals: BTreeMap<u32, f64> = BTreeMap::new();
        let mut successful = 0u32;
        for shot in self.shots.iter().filter(|shot| shot.status.is_ok()) {
            successful += 1;
            for record in &shot.records {
                *totals.entry(record.entry_idx).or_default() += f64::from(record.probability);
            }
        }
        if successful > 0 {
            for total in totals.values_mut() {
                *total /= f64::from(successful);
            }
        }
        totals
    }

    #[must_use]
    pub fn failed_shots(&self) -> Vec<&ShotResult> {
        self.shots.iter().filter(|shot| !shot.status.is_ok()).collect()
    }

    #[must_use]
    pub fn truncated_shots(&self) -> Vec<&ShotResult> {
        self.shots
            .iter()
            .filter(|shot| shot.dropped_records > 0)
            .collect()
    }
}

/// The op stream sent to the device and where each op came from.
#[derive(Debug, Default)]
struct DeviceProgram {
    ops: Vec<Op>,
    origin: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct GpuContext {
    config: RunConfig,
    program: Vec<Op>,
    device_program: Option<DeviceProgram>,

    gpu: GpuResources,
    cpu: CpuGrid,
}

impl GpuContext {
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    // See if we can get a GPU adapter on this machine (useful before trying to run tests)
    // Note: This does NOT allocate GPU resources that persist across runs. Run shots for that.
    pub fn try_create_adapter() -> Result<String> {
        Ok(format!("{:?}", GpuResources::try_get_adapter()?.get_info()))
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RunConfig) {
        if config.noise != self.config.noise
            || config.idle_noise.is_some() != self.config.idle_noise.is_some()
        {
            self.device_program = None;
        }
        self.config = config;
    }

    /// Set the program to be run
    pub fn set_program(&mut self, program: &[Op]) {
        self.program.clear();
        self.program.extend_from_slice(program);
        // Rebuild the ops to send to the device on the next run
        self.device_program = None;
    }

    /// Set the noise configuration
    pub fn set_noise_config(&mut self, noise: NoiseConfig) {
        self.config.noise = Some(noise);
        self.device_program = None;
    }

    pub fn set_idle_noise(&mut self, idle_noise: IdleNoiseConfig) {
        self.config.idle_noise = Some(idle_noise);
        self.device_program = None;
    }

    fn build_device_program(&self) -> DeviceProgram {
        let (mapped, mapped_origin) = map_program(
            &self.program,
            self.config.noise.as_ref(),
            self.config.idle_noise.is_some(),
            self.config.qubit_count,
        );

        // Every batch starts from |0...0⟩ and ends by reporting probabilities
        let mut ops = Vec::with_capacity(mapped.len() + 2);
        let mut origin = Vec::with_capacity(mapped.len() + 2);
        ops.push(Op::new_reset_all());
        origin.push(0);
        ops.extend(mapped);
        origin.extend(mapped_origin);
        if ops.last().is_none_or(|op| op.id != ops::MEVERYZ) {
            let (report, _) = map_program(
                &[Op::new_m_every_z_gate()],
                None,
                self.config.idle_noise.is_some(),
                self.config.qubit_count,
            );
            origin.extend(std::iter::repeat_n(
                self.program.len().saturating_sub(1),
                report.len(),
            ));
            ops.extend(report);
        }
        DeviceProgram { ops, origin }
    }

    fn resolve_backend(&self) -> Backend {
        // Use environment variable "QDK_SV_BACKEND" to override the configured backend if set
        let backend = std::env::var("QDK_SV_BACKEND")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(self.config.backend);
        match backend {
            Backend::Auto => {
                if GpuResources::try_get_adapter().is_ok() {
                    Backend::Gpu
                } else {
                    info!("no suitable GPU adapter found, running on the CPU grid");
                    Backend::Cpu
                }
            }
            other => other,
        }
    }

    pub fn run_shots_sync(&mut self) -> Result<RunResults> {
        futures::executor::block_on(self.run_shots())
    }

    /// Run the program for the configured number of shots
    pub async fn run_shots(&mut self) -> Result<RunResults> {
        self.config.validate()?;
        self.config.validate_program(&self.program)?;

        if self.device_program.is_none() {
            self.device_program = Some(self.build_device_program());
        }
        let Some(program) = self.device_program.take() else {
            return Err(SimError::EmptyProgram);
        };
        let result = self.run_program(&program).await;
        self.device_program = Some(program);
        result
    }

    async fn run_program(&mut self, program: &DeviceProgram) -> Result<RunResults> {
        let params = RunParams::new(&self.config, program.ops.len())?;
        let noise = self
            .config
            .idle_noise
            .as_ref()
            .map(IdleNoiseConfig::to_noise_params)
            .unwrap_or_default();

        // Use environment variable "QDK_SV_MAX_OPS_PER_DISPATCH" to override the default if set
        let max_ops_per_dispatch: usize = std::env::var("QDK_SV_MAX_OPS_PER_DISPATCH")
            .ok()
            .and_then(|val| val.parse().ok())
            .filter(|val| *val > 0)
            .unwrap_or(DEFAULT_MAX_OPS_PER_DISPATCH);

        info!(
            "running {} shots of {} ops on {} qubits in {} batch(es) of up to {} shots",
            params.shot_count,
            params.op_count,
            params.circuit_qubits,
            params.batch_count,
            params.shots_per_batch
        );
        debug!(
            "layout: {} workgroups per shot, {} entries per thread, submitting every {max_ops_per_dispatch} steps",
            params.layout.workgroups_per_shot, params.layout.entries_per_thread
        );

        let (device, batches) = match self.resolve_backend() {
            Backend::Gpu => {
                let dbg_capture = std::env::var("QDK_SV_CAPTURE").is_ok();
                self.gpu.ensure_device(dbg_capture).await?;
                let batches = run_batches(
                    &mut self.gpu,
                    &program.ops,
                    &noise,
                    &params,
                    &self.config,
                    max_ops_per_dispatch,
                )
                .await?;
                (self.gpu.name(), batches)
            }
            _ => {
                let batches = run_batches(
                    &mut self.cpu,
                    &program.ops,
                    &noise,
                    &params,
                    &self.config,
                    max_ops_per_dispatch,
                )
                .await?;
                (self.cpu.name(), batches)
            }
        };
        info!("ran on {device}");

        let results = collect_results(batches, program, &params, self.config.capture_state, device);
        log_shot_problems(&results);
        Ok(results)
    }
}

async fn run_batches<D: ComputeDevice>(
    device: &mut D,
    ops: &[Op],
    noise: &NoiseParams,
    params: &RunParams,
    config: &RunConfig,
    max_ops_per_dispatch: usize,
) -> Result<Vec<BatchOutput>> {
    device.load_program(ops, noise)?;
    device.prepare_run(params)?;

    let mut outputs = Vec::with_capacity(params.batch_count as usize);
    let mut shots_remaining = params.shot_count;

    for batch_idx in 0..params.batch_count {
        let shots_this_batch = min(shots_remaining, params.shots_per_batch);

        // Update the uniforms for this batch
        let uniforms = Uniforms {
            batch_start_shot_id: batch_idx * params.shots_per_batch,
            rng_seed: config.seed,
            shot_count: shots_this_batch,
            qubit_count: params.circuit_qubits,
            result_threshold: config.result_threshold,
            results_per_shot: params.results_per_shot,
            result_count: params.result_count,
            op_count: params.op_count,
        };
        device.begin_batch(&uniforms)?;
        debug!(
            "batch {batch_idx}: shots {}..{}",
            uniforms.batch_start_shot_id,
            uniforms.batch_start_shot_id + shots_this_batch
        );

        for step in 1..=params.op_count as usize {
            let fence = device.dispatch_prepare()?;
            device.dispatch_execute(fence)?;
            // Submit in chunks to avoid exceeding the driver's time limit for one submission
            if step % max_ops_per_dispatch == 0 {
                device.submit()?;
            }
        }
        device.submit()?;

        outputs.push(device.read_batch(config.capture_state).await?);
        shots_remaining -= shots_this_batch;
    }
    Ok(outputs)
}

fn collect_results(
    batches: Vec<BatchOutput>,
    program: &DeviceProgram,
    params: &RunParams,
    capture_state: bool,
    device: String,
) -> RunResults {
    let results_per_shot = params.results_per_shot as usize;
    let result_count = params.result_count as usize;
    let circuit_entries = 1usize << params.circuit_qubits;
    let entries_per_shot = params.layout.entries_per_shot();

    let mut shots = Vec::with_capacity(params.shot_count as usize);
    let mut state_vectors = capture_state.then(Vec::new);

    for batch in batches {
        for (i, shot) in batch.shots.iter().enumerate() {
            let written = batch.result_counts[i] as usize;
            let mut records =
                batch.results[i * results_per_shot..i * results_per_shot + written.min(results_per_shot)]
                    .to_vec();
            records.sort_by_key(|record| record.entry_idx);

            shots.push(ShotResult {
                shot_id: shot.shot_id,
                status: ShotStatus::from_shot_data(shot, &program.ops, &program.origin),
                records,
                dropped_records: u32::try_from(written.saturating_sub(results_per_shot))
                    .unwrap_or(u32::MAX),
                measurements: batch.measurements[i * result_count..(i + 1) * result_count]
                    .to_vec(),
                elapsed: shot.elapsed,
                qubit_heat: shot
                    .qubits
                    .iter()
                    .take(params.circuit_qubits as usize)
                    .map(|qubit| qubit.heat)
                    .collect(),
            });

            if let (Some(vectors), Some(state)) = (state_vectors.as_mut(), batch.state.as_ref()) {
                let start = i * entries_per_shot;
                vectors.push(state[start..start + circuit_entries].to_vec());
            }
        }
    }

    let success = shots.iter().all(|shot| shot.status.is_ok());
    RunResults {
        shots,
        state_vectors,
        success,
        device,
    }
}

fn log_shot_problems(results: &RunResults) {
    let failed = results.failed_shots();
    if let Some(first) = failed.first() {
        warn!(
            "{} of {} shots failed; first failure in shot {}: {:?}",
            failed.len(),
            results.shots.len(),
            first.shot_id,
            first.status
        );
    }
    let truncated = results.truncated_shots();
    if !truncated.is_empty() {
        let dropped: u64 = truncated
            .iter()
            .map(|shot| u64::from(shot.dropped_records))
            .sum();
        warn!(
            "{} shots exceeded their results capacity; {dropped} records were dropped",
            truncated.len()
        );
    }
}
