// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU32, Ordering};

use num_complex::Complex32;
use rayon::prelude::*;

use crate::device::{BatchOutput, ComputeDevice, Fence};
use crate::error::Result;
use crate::gpu_context::RunParams;
use crate::kernels::{
    AtomicRecord, KernelContext, ShotLayout, ShotResultsView, execute_op, op_fits_in_shard,
    prepare_op,
};
use crate::shader_types::{
    MAX_QUBITS_PER_WORKGROUP, NoiseParams, Op, ShotData, Uniforms, WorkgroupSums,
};

/// Runs the kernels on the CPU, emulating the dispatch grid with rayon.
///
/// Prepare runs one task per shot. Execute runs one task per shot, and inside a
/// shot runs workgroups in parallel over their own shards whenever the op stays
/// inside a shard, or one after another over the whole block otherwise.
#[derive(Debug)]
pub struct CpuGrid {
    ops: Vec<Op>,
    noise: NoiseParams,
    uniforms: Uniforms,
    layout: ShotLayout,
    results_per_shot: usize,
    result_count: usize,

    shots: Vec<ShotData>,
    state: Vec<Complex32>,
    sums: Vec<WorkgroupSums>,
    results: Vec<AtomicRecord>,
    cursors: Vec<AtomicU32>,
    measurements: Vec<u32>,

    steps: u32,
}

impl Default for CpuGrid {
    fn default() -> Self {
        Self {
            ops: Vec::new(),
            noise: NoiseParams::default(),
            uniforms: Uniforms::default(),
            layout: ShotLayout::new(0, MAX_QUBITS_PER_WORKGROUP),
            results_per_shot: 0,
            result_count: 0,
            shots: Vec::new(),
            state: Vec::new(),
            sums: Vec::new(),
            results: Vec::new(),
            cursors: Vec::new(),
            measurements: Vec::new(),
            steps: 0,
        }
    }
}

impl CpuGrid {
    fn active_shots(&self) -> usize {
        self.uniforms.shot_count as usize
    }

    /// Measurement slots per shot in the buffer (at least one so chunks are never empty).
    fn measurement_stride(&self) -> usize {
        self.result_count.max(1)
    }

    /// The amplitude blocks of the batch's shots.
    #[must_use]
    pub fn state(&self) -> &[Complex32] {
        &self.state[..self.active_shots() * self.layout.entries_per_shot()]
    }

    #[must_use]
    pub fn shots(&self) -> &[ShotData] {
        &self.shots[..self.active_shots()]
    }
}

impl ComputeDevice for CpuGrid {
    fn name(&self) -> String {
        format!("CPU ({} threads)", rayon::current_num_threads())
    }

    fn load_program(&mut self, ops: &[Op], noise: &NoiseParams) -> Result<()> {
        self.ops.clear();
        self.ops.extend_from_slice(ops);
        self.noise = *noise;
        Ok(())
    }

    fn prepare_run(&mut self, params: &RunParams) -> Result<()> {
        let shots = params.shots_per_batch as usize;
        self.layout = params.layout;
        self.results_per_shot = params.results_per_shot as usize;
        self.result_count = params.result_count as usize;

        self.shots.resize(shots, ShotData::default());
        self.state
            .resize(shots * self.layout.entries_per_shot(), Complex32::new(0.0, 0.0));
        self.sums.resize(
            shots * self.layout.workgroups_per_shot as usize,
            WorkgroupSums::default(),
        );
        self.results
            .resize_with(shots * self.results_per_shot, AtomicRecord::default);
        self.cursors.resize_with(shots, AtomicU32::default);
        self.measurements
            .resize(shots * self.measurement_stride(), 0);
        Ok(())
    }

    fn begin_batch(&mut self, uniforms: &Uniforms) -> Result<()> {
        self.uniforms = *uniforms;
        self.shots.fill(ShotData::default());
        self.steps = 0;
        Ok(())
    }

    fn dispatch_prepare(&mut self) -> Result<Fence> {
        let active = self.active_shots();
        let workgroups = self.layout.workgroups_per_shot as usize;
        let result_count = self.result_count;
        let stride = self.measurement_stride();
        let ctx = KernelContext {
            ops: &self.ops,
            uniforms: &self.uniforms,
            noise: &self.noise,
            layout: self.layout,
        };

        self.shots[..active]
            .par_iter_mut()
            .zip(self.sums.par_chunks(workgroups))
            .zip(self.cursors.par_iter())
            .zip(self.measurements.par_chunks_mut(stride))
            .enumerate()
            .for_each(|(shot_idx, (((shot, sums), cursor), measurements))| {
                #[allow(clippy::cast_possible_truncation)]
                prepare_op(
                    &ctx,
                    shot_idx as u32,
                    shot,
                    sums,
                    cursor,
                    &mut measurements[..result_count],
                );
            });

        let fence = Fence::new(self.steps);
        self.steps += 1;
        Ok(fence)
    }

    fn dispatch_execute(&mut self, _fence: Fence) -> Result<()> {
        let active = self.active_shots();
        let layout = self.layout;
        let workgroups = layout.workgroups_per_shot as usize;
        let shard = layout.entries_per_workgroup();
        let results_per_shot = self.results_per_shot;
        let ctx = KernelContext {
            ops: &self.ops,
            uniforms: &self.uniforms,
            noise: &self.noise,
            layout,
        };

        self.shots[..active]
            .par_iter()
            .zip(self.state.par_chunks_mut(layout.entries_per_shot()))
            .zip(self.sums.par_chunks_mut(workgroups))
            .zip(self.cursors.par_iter())
            .zip(self.results.par_chunks(results_per_shot))
            .for_each(|((((shot, block), sums), cursor), slots)| {
                let results = ShotResultsView { cursor, slots };
                if op_fits_in_shard(&ctx, shot) {
                    block
                        .par_chunks_mut(shard)
                        .zip(sums.par_iter_mut())
                        .enumerate()
                        .for_each(|(workgroup, (shard_block, wg_sums))| {
                            #[allow(clippy::cast_possible_truncation)]
                            execute_op(
                                &ctx,
                                workgroup as u32,
                                shot,
                                shard_block,
                                workgroup * shard,
                                wg_sums,
                                &results,
                            );
                        });
                } else {
                    for (workgroup, wg_sums) in (0u32..).zip(sums.iter_mut()) {
                        execute_op(&ctx, workgroup, shot, block, 0, wg_sums, &results);
                    }
                }
            });
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        // Dispatches run as they are issued
        Ok(())
    }

    async fn read_batch(&mut self, capture_state: bool) -> Result<BatchOutput> {
        let active = self.active_shots();
        let stride = self.measurement_stride();
        let measurements = self
            .measurements
            .chunks(stride)
            .take(active)
            .flat_map(|chunk| chunk[..self.result_count].iter().copied())
            .collect();

        Ok(BatchOutput {
            shots: self.shots().to_vec(),
            result_counts: self.cursors[..active]
                .iter()
                .map(|cursor| cursor.load(Ordering::Relaxed))
                .collect(),
            results: self.results[..active * self.results_per_shot]
                .iter()
                .map(AtomicRecord::load)
                .collect(),
            measurements,
            state: capture_state.then(|| self.state().to_vec()),
        })
    }
}
