// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use num_complex::Complex32;

use crate::error::Result;
use crate::gpu_context::RunParams;
use crate::shader_types::{NoiseParams, Op, ResultRecord, ShotData, Uniforms};

/// Proof that a Prepare dispatch was issued. Execute consumes it, so an Execute
/// can never be encoded without the Prepare that feeds it.
#[derive(Debug)]
#[must_use = "an Execute dispatch must consume the fence of its Prepare"]
pub struct Fence {
    step: u32,
}

impl Fence {
    pub(crate) fn new(step: u32) -> Self {
        Self { step }
    }

    #[must_use]
    pub fn step(&self) -> u32 {
        self.step
    }
}

/// Buffers read back after the last step of a batch, trimmed to the batch's shots.
#[derive(Debug, Default)]
pub struct BatchOutput {
    pub shots: Vec<ShotData>,
    /// Number of records each shot tried to write, including dropped ones.
    pub result_counts: Vec<u32>,
    /// `results_per_shot` slots per shot.
    pub results: Vec<ResultRecord>,
    /// `result_count` measurement results per shot.
    pub measurements: Vec<u32>,
    /// Full amplitude blocks per shot, when state capture was requested.
    pub state: Option<Vec<Complex32>>,
}

/// Something that can run the Prepare and Execute kernels over a batch of shots.
#[allow(async_fn_in_trait)]
pub trait ComputeDevice {
    fn name(&self) -> String;

    /// Upload the op stream and noise parameters for the following runs.
    fn load_program(&mut self, ops: &[Op], noise: &NoiseParams) -> Result<()>;

    /// Size buffers (and compile kernels where needed) for a run.
    fn prepare_run(&mut self, params: &RunParams) -> Result<()>;

    /// Set the uniforms for a batch and rewind every shot's control block.
    fn begin_batch(&mut self, uniforms: &Uniforms) -> Result<()>;

    fn dispatch_prepare(&mut self) -> Result<Fence>;

    fn dispatch_execute(&mut self, fence: Fence) -> Result<()>;

    /// Send queued dispatches to the device.
    fn submit(&mut self) -> Result<()>;

    async fn read_batch(&mut self, capture_state: bool) -> Result<BatchOutput>;
}
