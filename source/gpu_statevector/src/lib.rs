// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Full state vector simulation of many independent shots at once.
//!
//! Every shot owns its own amplitudes, random stream and control block. A run
//! alternates two kernels for every op in the program: `prepare_op` does the
//! per-shot sequential work, and `execute_op` updates amplitudes in parallel.
//! The kernels run on a GPU through wgpu, or on the CPU through rayon.

pub mod addressing;
pub mod cpu_grid;
pub mod device;
pub mod error;
pub mod gpu_context;
mod gpu_resources;
pub mod kernels;
pub mod noise_config;
pub mod noise_mapping;
pub mod rng;
pub mod shader_types;

pub use error::{Result, ShotStatus, SimError};
pub use gpu_context::{Backend, GpuContext, RunConfig, RunResults, ShotResult};
pub use noise_config::{IdleNoiseConfig, NoiseConfig, NoiseTable};
pub use shader_types::{Op, OpID, ResultRecord};

/// Describe the GPU adapter a run would use, or why there is none.
pub fn try_create_gpu_adapter() -> Result<String> {
    GpuContext::try_create_adapter()
}

/// Run `program` with `config`, blocking until every shot has finished.
pub fn run_shots_sync(program: &[Op], config: &RunConfig) -> Result<RunResults> {
    let mut context = GpuContext::new(config.clone());
    context.set_program(program);
    context.run_shots_sync()
}
