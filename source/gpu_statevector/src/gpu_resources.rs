// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytemuck::{bytes_of, cast_slice};
use num_complex::Complex32;
use wgpu::{
    Adapter, BindGroup, BindGroupEntry, BindGroupLayout, Buffer, BufferDescriptor, BufferUsages,
    CommandEncoder, ComputePipeline, ComputePipelineDescriptor, Device, PollType, Queue,
};

use crate::device::{BatchOutput, ComputeDevice, Fence};
use crate::error::{Result, SimError};
use crate::gpu_context::RunParams;
use crate::shader_types::{
    MAX_BUFFER_SIZE, MAX_QUBIT_COUNT, NoiseParams, Op, ResultRecord, ShotData,
    THREADS_PER_WORKGROUP, Uniforms,
};

fn device_error(message: impl Into<String>) -> SimError {
    SimError::Device(message.into())
}

#[derive(Debug, Default)]
pub struct GpuResources {
    adapter: Option<Adapter>,
    device: Option<Device>,
    bind_group_layout: Option<BindGroupLayout>,
    dbg_capture: bool,
    queue: Option<Queue>,
    device_resources: GpuDeviceResources,

    // Per-run state
    shader_params: Option<ShaderParams>,
    workgroups_per_shot: u32,
    results_per_shot: usize,
    result_count: usize,
    measurement_stride: usize,
    entries_per_shot: usize,
    shots_this_batch: u32,
    pending: Vec<Dispatch>,
    steps: u32,
}

// Resources that depend on the device and need to be recreated if the device is recreated
#[derive(Debug)]
struct GpuDeviceResources {
    pub kernels: Option<GpuKernels>,
    pub bind_group: Option<BindGroup>,
    pub bound_buffers: Vec<BufferBinding>,
}

#[derive(Debug)]
pub struct GpuKernels {
    pub prepare_op: ComputePipeline,
    pub execute_op: ComputePipeline,
}

#[derive(Debug)]
struct BufferBinding {
    pub name: &'static str,
    pub is_uniform: bool,
    pub read_only: bool,
    pub usage: BufferUsages,
    pub buffer: Option<Buffer>,
}

/// Values baked into the compiled shader. Kernels are rebuilt when these change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ShaderParams {
    workgroups_per_shot: u32,
    entries_per_thread: u32,
    entries_per_shot: usize,
    measurement_stride: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dispatch {
    Prepare,
    Execute,
}

// Keep the below in sync with the shader bindings in simulator.wgsl
const OPS_BUF_IDX: usize = 0;
const SHOTS_BUF_IDX: usize = 1;
const STATE_VECTOR_BUF_IDX: usize = 2;
const SUMS_BUF_IDX: usize = 3;
const RESULTS_BUF_IDX: usize = 4;
const RESULT_CURSORS_BUF_IDX: usize = 5;
const MEASUREMENTS_BUF_IDX: usize = 6;
const UNIFORM_BUF_IDX: usize = 7;
const NOISE_PARAMS_BUF_IDX: usize = 8;

impl BufferBinding {
    fn storage(name: &'static str, read_only: bool, usage: BufferUsages) -> Self {
        Self {
            name,
            is_uniform: false,
            read_only,
            usage: BufferUsages::STORAGE | usage,
            buffer: None,
        }
    }
}

impl Default for GpuDeviceResources {
    fn default() -> Self {
        GpuDeviceResources {
            kernels: None,
            bind_group: None,
            bound_buffers: vec![
                BufferBinding::storage("Ops", true, BufferUsages::COPY_DST),
                BufferBinding::storage(
                    "Shots",
                    false,
                    BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
                ),
                BufferBinding::storage("StateVector", false, BufferUsages::COPY_SRC),
                BufferBinding::storage("WorkgroupSums", false, BufferUsages::COPY_DST),
                BufferBinding::storage("Results", false, BufferUsages::COPY_SRC),
                BufferBinding::storage(
                    "ResultCursors",
                    false,
                    BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
                ),
                BufferBinding::storage("Measurements", false, BufferUsages::COPY_SRC),
                BufferBinding {
                    name: "Uniforms",
                    is_uniform: true,
                    read_only: false,
                    usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                    buffer: None,
                },
                BufferBinding::storage("NoiseParams", true, BufferUsages::COPY_DST),
            ],
        }
    }
}

impl Drop for GpuResources {
    fn drop(&mut self) {
        // If a device was capturing, stop the capture on drop
        self.stop_graphics_debugger_capture();
    }
}

impl GpuResources {
    #[cfg(target_arch = "wasm32")]
    pub fn try_get_adapter() -> Result<Adapter> {
        Err(device_error("wasm32 is not supported currently"))
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn try_get_adapter() -> Result<Adapter> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);

        let score_adapter = |adapter: &Adapter| -> (u32, u32, u32, u32) {
            let info = adapter.get_info();
            let device_score = match info.device_type {
                wgpu::DeviceType::DiscreteGpu => 8,
                wgpu::DeviceType::IntegratedGpu => 4,
                _ => 0,
            };
            let backend_score = match info.backend {
                wgpu::Backend::Vulkan | wgpu::Backend::Metal => 2,
                wgpu::Backend::Dx12 => 1,
                _ => 0,
            };
            let limits = adapter.limits();
            (
                device_score,
                backend_score,
                limits.max_compute_workgroup_storage_size,
                limits.max_storage_buffer_binding_size,
            )
        };

        // Filter to discrete or integrated GPUs that support Vulkan, Metal, or DX12
        // Then sort prefering discrete over integrated, Vulkan/Metal over DX12, and most workgroup memory
        let adapter = adapters
            .into_iter()
            .filter(|a| {
                let score = score_adapter(a);
                // Require a storage buffer of at least 1GB to hold state vectors of up to 27 qubits
                score.0 > 0 /* discrete or integrated */ &&
                score.1 > 0 /* supported backend */ &&
                score.2 >= (1u32 << 14) /* at least 16KB compute workgroup storage */ &&
                score.3 >= (1u32 << 30) /* at least 1GB storage buffers */
            })
            .max_by_key(score_adapter)
            .ok_or_else(|| device_error("No suitable GPU adapter found"))?;

        Ok(adapter)
    }

    fn stop_graphics_debugger_capture(&self) {
        if let Some(device) = &self.device
            && self.dbg_capture
        {
            unsafe {
                device.stop_graphics_debugger_capture();
            }
        }
    }

    pub async fn create_device(&mut self, dbg_capture: bool) -> Result<()> {
        // If we already had a prior device and it was capturing, stop any existing capture on it.
        self.stop_graphics_debugger_capture();

        // WebGPU disallows creating a device multiple times from the same adapter,
        // so recreate the adapter as well if creating a device and queue.
        let adapter = Self::try_get_adapter()?;

        let adapter_limits = adapter.limits();
        #[allow(clippy::cast_possible_truncation)]
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: MAX_BUFFER_SIZE as u32,
            ..adapter_limits
        };

        let (device, queue): (Device, Queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("QDK GPU state vector simulator"),
                // Mappable primary buffers work around https://github.com/gfx-rs/wgpu/issues/8111
                required_features: wgpu::Features::MAPPABLE_PRIMARY_BUFFERS,
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| device_error(e.to_string()))?;

        if dbg_capture {
            unsafe {
                device.start_graphics_debugger_capture();
            }
        }
        // Drop any resources created with a prior device, since the new device will be used now
        self.device_resources = GpuDeviceResources::default();
        self.shader_params = None;

        // Create the fixed sized buffers
        self.device_resources.bound_buffers[UNIFORM_BUF_IDX].buffer = Some(create_dst_buffer(
            &device,
            std::mem::size_of::<Uniforms>(),
            BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            "Uniform Buffer",
        ));
        self.device_resources.bound_buffers[NOISE_PARAMS_BUF_IDX].buffer =
            Some(create_dst_buffer(
                &device,
                std::mem::size_of::<NoiseParams>(),
                BufferUsages::STORAGE | BufferUsages::COPY_DST,
                "Noise Params Buffer",
            ));

        log::info!("created GPU device on {:?}", adapter.get_info());
        self.adapter = Some(adapter);
        self.device = Some(device);
        self.dbg_capture = dbg_capture;
        self.queue = Some(queue);
        self.create_bind_group_layout()
    }

    pub async fn ensure_device(&mut self, dbg_capture: bool) -> Result<()> {
        if self.device.is_none() {
            self.create_device(dbg_capture).await?;
        }
        Ok(())
    }

    fn try_device(&self) -> Result<&Device> {
        self.device
            .as_ref()
            .ok_or_else(|| device_error("GPU device not initialized"))
    }

    fn try_queue(&self) -> Result<&Queue> {
        self.queue
            .as_ref()
            .ok_or_else(|| device_error("GPU queue not initialized"))
    }

    fn create_bind_group_layout(&mut self) -> Result<()> {
        let device = self.try_device()?;

        #[allow(clippy::cast_possible_truncation)]
        let entries = self
            .device_resources
            .bound_buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer_bindings)| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: if buffer_bindings.is_uniform {
                        wgpu::BufferBindingType::Uniform
                    } else {
                        wgpu::BufferBindingType::Storage {
                            read_only: buffer_bindings.read_only,
                        }
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect::<Vec<_>>();

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Simulator bind group layout"),
            entries: &entries,
        });
        self.bind_group_layout = Some(layout);
        Ok(())
    }

    fn create_shaders(&mut self, params: ShaderParams) -> Result<()> {
        let device = self.try_device()?;
        let bind_group_layout = self
            .bind_group_layout
            .as_ref()
            .ok_or_else(|| device_error("Bind group layout not initialized"))?;

        let shader_src = shader_source(params);

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("GPU Simulator Shader Module"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GPU simulator pipeline layout"),
            bind_group_layouts: &[bind_group_layout],
            push_constant_ranges: &[],
        });

        let get_kernel = |name: &str| -> ComputePipeline {
            device.create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(&format!("GPU kernel - {name}")),
                layout: Some(&pipeline_layout),
                module: &shader_module,
                entry_point: Some(name),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        self.device_resources.kernels = Some(GpuKernels {
            prepare_op: get_kernel("prepare_op"),
            execute_op: get_kernel("execute_op"),
        });
        self.shader_params = Some(params);
        Ok(())
    }

    fn get_kernels(&self) -> Result<&GpuKernels> {
        self.device_resources
            .kernels
            .as_ref()
            .ok_or_else(|| device_error("GPU kernels not initialized"))
    }

    fn get_bind_group(&mut self) -> Result<BindGroup> {
        if let Some(ref bind_group) = self.device_resources.bind_group {
            // Already created. BindGroup largely wraps ref-counted handles, so cloning is cheap.
            return Ok(bind_group.clone());
        }

        let device = self.try_device()?;
        let bind_group_layout = self
            .bind_group_layout
            .as_ref()
            .ok_or_else(|| device_error("Missing layout"))?;

        let entries = self
            .device_resources
            .bound_buffers
            .iter()
            .zip(0u32..)
            .map(|(buffer_binding, binding)| {
                buffer_binding
                    .buffer
                    .as_ref()
                    .map(|buffer| BindGroupEntry {
                        binding,
                        resource: buffer.as_entire_binding(),
                    })
                    .ok_or_else(|| {
                        device_error(format!(
                            "Buffer {} must be created before creating the bind group",
                            buffer_binding.name
                        ))
                    })
            })
            .collect::<Result<Vec<BindGroupEntry>>>()?;

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Simulator Bind Group"),
            layout: bind_group_layout,
            entries: &entries,
        });
        self.device_resources.bind_group = Some(bind_group.clone());
        Ok(bind_group)
    }

    fn get_encoder(&self, label: &str) -> Result<CommandEncoder> {
        let device = self.try_device()?;
        Ok(device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) }))
    }

    fn try_get_buffer(&self, buf_idx: usize) -> Result<&Buffer> {
        self.device_resources.bound_buffers[buf_idx]
            .buffer
            .as_ref()
            .ok_or_else(|| device_error(format!("Buffer at index {buf_idx} not initialized")))
    }

    // Verify that the per-run buffers are created and of sufficient size, recreating them if needed
    fn ensure_run_buffers(&mut self, params: &RunParams) -> Result<()> {
        let device = self.device.as_ref().ok_or_else(|| device_error("GPU device not initialized"))?;

        let mut check_buffer = |idx: usize, required_size: usize| {
            let buf_binding = &mut self.device_resources.bound_buffers[idx];
            if let Some(ref buffer) = buf_binding.buffer
                && buffer.size() == required_size as u64
            {
                // Buffer is already the correct size, no need to recreate
            } else {
                let new_buffer =
                    create_dst_buffer(device, required_size, buf_binding.usage, buf_binding.name);
                buf_binding.buffer = Some(new_buffer);
                self.device_resources.bind_group = None; // Invalidate bind group to recreate later
            }
        };

        for (idx, size) in [
            (SHOTS_BUF_IDX, params.shots_buffer_size),
            (STATE_VECTOR_BUF_IDX, params.state_vector_buffer_size),
            (SUMS_BUF_IDX, params.sums_buffer_size),
            (RESULTS_BUF_IDX, params.results_buffer_size),
            (RESULT_CURSORS_BUF_IDX, params.cursors_buffer_size),
            (MEASUREMENTS_BUF_IDX, params.measurements_buffer_size),
        ] {
            check_buffer(idx, size);
        }
        Ok(())
    }

    fn upload_data(&mut self, data: &[u8], buf_idx: usize) -> Result<()> {
        let device = self.device.as_ref().ok_or_else(|| device_error("GPU device not initialized"))?;
        let queue = self.queue.as_ref().ok_or_else(|| device_error("GPU queue not initialized"))?;

        let dst_buffer = &mut self.device_resources.bound_buffers[buf_idx];

        if let Some(ref buffer) = dst_buffer.buffer
            && buffer.size() == data.len() as u64
        {
            // Buffer is already the correct size, no need to recreate
            copy_data_to_gpu(device, queue, data, buffer);
        } else {
            let new_buffer =
                create_dst_buffer(device, data.len(), dst_buffer.usage, dst_buffer.name);
            copy_data_to_gpu(device, queue, data, &new_buffer);
            dst_buffer.buffer = Some(new_buffer);
            self.device_resources.bind_group = None; // Invalidate bind group to recreate later
        }
        Ok(())
    }

    async fn download(&self, buffers: &[usize]) -> Result<Vec<Vec<u8>>> {
        let device = self.try_device()?;
        let sources = buffers
            .iter()
            .map(|idx| self.try_get_buffer(*idx))
            .collect::<Result<Vec<_>>>()?;
        let total_size: u64 = sources.iter().map(|buffer| buffer.size()).sum();

        let download = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Download buffer"),
            size: total_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.get_encoder("Download Command Encoder")?;
        let mut offset = 0;
        for source in &sources {
            encoder.copy_buffer_to_buffer(source, 0, &download, offset, source.size());
            offset += source.size();
        }
        self.try_queue()?.submit([encoder.finish()]);

        // Cross-platform readback: async map + native poll
        let buffer_slice = download.slice(..);

        let (sender, receiver) = futures::channel::oneshot::channel();

        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        // Block until all pending GPU work is complete
        device
            .poll(PollType::wait_indefinitely())
            .map_err(|e| device_error(format!("GPU poll failed: {e}")))?;

        // Await the mapping completion (which is a Result of a Result - check both)
        receiver
            .await
            .map_err(|_| device_error("Failed to receive map completion"))?
            .map_err(|e| device_error(format!("Buffer mapping failed: {e}")))?;

        let data = buffer_slice.get_mapped_range();
        let mut downloaded = Vec::with_capacity(sources.len());
        let mut start = 0;
        for source in &sources {
            #[allow(clippy::cast_possible_truncation)]
            let end = start + source.size() as usize;
            downloaded.push(data[start..end].to_vec());
            start = end;
        }

        drop(data);
        download.unmap();
        Ok(downloaded)
    }
}

impl ComputeDevice for GpuResources {
    fn name(&self) -> String {
        self.adapter.as_ref().map_or_else(
            || "GPU (no adapter)".to_string(),
            |adapter| {
                let info = adapter.get_info();
                format!("GPU ({}, {:?})", info.name, info.backend)
            },
        )
    }

    fn load_program(&mut self, ops: &[Op], noise: &NoiseParams) -> Result<()> {
        self.upload_data(cast_slice(ops), OPS_BUF_IDX)?;
        self.try_queue()?
            .write_buffer(self.try_get_buffer(NOISE_PARAMS_BUF_IDX)?, 0, bytes_of(noise));
        Ok(())
    }

    fn prepare_run(&mut self, params: &RunParams) -> Result<()> {
        let shader_params = ShaderParams {
            workgroups_per_shot: params.layout.workgroups_per_shot,
            entries_per_thread: params.layout.entries_per_thread,
            entries_per_shot: params.layout.entries_per_shot(),
            measurement_stride: params.result_count.max(1) as usize,
        };
        if self.shader_params != Some(shader_params) {
            self.create_shaders(shader_params)?;
        }
        self.ensure_run_buffers(params)?;

        self.workgroups_per_shot = params.layout.workgroups_per_shot;
        self.results_per_shot = params.results_per_shot as usize;
        self.result_count = params.result_count as usize;
        self.measurement_stride = shader_params.measurement_stride;
        self.entries_per_shot = shader_params.entries_per_shot;
        Ok(())
    }

    fn begin_batch(&mut self, uniforms: &Uniforms) -> Result<()> {
        // When this is put directly on the queue, it will be submitted when the next submit occurs, but will run before that submit's work
        self.try_queue()?
            .write_buffer(self.try_get_buffer(UNIFORM_BUF_IDX)?, 0, bytes_of(uniforms));

        // Rewind every shot so the first Prepare starts at op 0
        let mut encoder = self.get_encoder("Batch Reset Encoder")?;
        encoder.clear_buffer(self.try_get_buffer(SHOTS_BUF_IDX)?, 0, None);
        encoder.clear_buffer(self.try_get_buffer(SUMS_BUF_IDX)?, 0, None);
        encoder.clear_buffer(self.try_get_buffer(RESULT_CURSORS_BUF_IDX)?, 0, None);
        self.try_queue()?.submit([encoder.finish()]);

        self.shots_this_batch = uniforms.shot_count;
        self.pending.clear();
        self.steps = 0;
        Ok(())
    }

    fn dispatch_prepare(&mut self) -> Result<Fence> {
        self.pending.push(Dispatch::Prepare);
        let fence = Fence::new(self.steps);
        self.steps += 1;
        Ok(fence)
    }

    fn dispatch_execute(&mut self, _fence: Fence) -> Result<()> {
        self.pending.push(Dispatch::Execute);
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let bind_group = self.get_bind_group()?;
        let kernels = self.get_kernels()?;

        let prepare_workgroup_count = self.shots_this_batch;
        // Workgroups for execute_op depends on qubit count
        let execute_workgroup_count = self.workgroups_per_shot * self.shots_this_batch;

        let mut encoder = self.get_encoder("StateVector Command Encoder")?;
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("StateVector Compute Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_bind_group(0, &bind_group, &[]);

            for dispatch in &self.pending {
                match dispatch {
                    Dispatch::Prepare => {
                        compute_pass.set_pipeline(&kernels.prepare_op);
                        compute_pass.dispatch_workgroups(prepare_workgroup_count, 1, 1);
                    }
                    Dispatch::Execute => {
                        compute_pass.set_pipeline(&kernels.execute_op);
                        compute_pass.dispatch_workgroups(execute_workgroup_count, 1, 1);
                    }
                }
            }
        }
        self.try_queue()?.submit([encoder.finish()]);
        self.pending.clear();
        Ok(())
    }

    async fn read_batch(&mut self, capture_state: bool) -> Result<BatchOutput> {
        self.submit()?;

        let mut buffers = vec![
            SHOTS_BUF_IDX,
            RESULT_CURSORS_BUF_IDX,
            RESULTS_BUF_IDX,
            MEASUREMENTS_BUF_IDX,
        ];
        if capture_state {
            buffers.push(STATE_VECTOR_BUF_IDX);
        }
        let data = self.download(&buffers).await?;

        let active = self.shots_this_batch as usize;
        let shots: Vec<ShotData> = bytemuck::pod_collect_to_vec(data[0].as_slice());
        let result_counts: Vec<u32> = bytemuck::pod_collect_to_vec(data[1].as_slice());
        let results: Vec<ResultRecord> = bytemuck::pod_collect_to_vec(data[2].as_slice());
        let measurement_slots: Vec<u32> = bytemuck::pod_collect_to_vec(data[3].as_slice());

        let measurements = measurement_slots
            .chunks(self.measurement_stride)
            .take(active)
            .flat_map(|chunk| chunk[..self.result_count].iter().copied())
            .collect();
        let state = data.get(4).map(|bytes| {
            let mut amplitudes: Vec<Complex32> = bytemuck::pod_collect_to_vec(bytes.as_slice());
            amplitudes.truncate(active * self.entries_per_shot);
            amplitudes
        });

        Ok(BatchOutput {
            shots: shots[..active].to_vec(),
            result_counts: result_counts[..active].to_vec(),
            results: results[..active * self.results_per_shot].to_vec(),
            measurements,
            state,
        })
    }
}

fn shader_source(params: ShaderParams) -> String {
    let raw_shader_src = include_str!("simulator.wgsl");
    raw_shader_src
        .replace(
            "{{THREADS_PER_WORKGROUP}}",
            &THREADS_PER_WORKGROUP.to_string(),
        )
        .replace(
            "{{WORKGROUPS_PER_SHOT}}",
            &params.workgroups_per_shot.to_string(),
        )
        .replace(
            "{{ENTRIES_PER_THREAD}}",
            &params.entries_per_thread.to_string(),
        )
        .replace("{{ENTRIES_PER_SHOT}}", &params.entries_per_shot.to_string())
        .replace("{{MAX_QUBIT_COUNT}}", &MAX_QUBIT_COUNT.to_string())
        .replace(
            "{{MEASUREMENT_STRIDE}}",
            &params.measurement_stride.to_string(),
        )
}

fn create_dst_buffer(
    device: &Device,
    buffer_size: usize,
    usage: BufferUsages,
    label: &str,
) -> Buffer {
    device.create_buffer(&BufferDescriptor {
        label: Some(label),
        size: buffer_size as u64,
        usage,
        mapped_at_creation: false,
    })
}

fn copy_data_to_gpu(device: &Device, queue: &Queue, data: &[u8], target: &Buffer) {
    let upload_buffer = device.create_buffer(&BufferDescriptor {
        label: Some("Tmp Upload Buffer"),
        size: data.len() as u64,
        usage: BufferUsages::COPY_SRC | BufferUsages::MAP_WRITE,
        mapped_at_creation: true,
    });

    upload_buffer
        .slice(..)
        .get_mapped_range_mut()
        .copy_from_slice(data);
    upload_buffer.unmap();

    // Copy from the upload buffer to the GPU buffer
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Buffer Upload Copy Encoder"),
    });
    encoder.copy_buffer_to_buffer(&upload_buffer, 0, target, 0, data.len() as u64);
    queue.submit([encoder.finish()]);
}

#[cfg(test)]
mod tests {
    use super::{ShaderParams, shader_source};

    #[test]
    fn shader_template_is_fully_substituted() {
        let source = shader_source(ShaderParams {
            workgroups_per_shot: 4,
            entries_per_thread: 32,
            entries_per_shot: 4096,
            measurement_stride: 3,
        });
        assert!(!source.contains("{{"));
        assert!(source.contains("const WORKGROUPS_PER_SHOT: u32 = 4u;"));
        assert!(source.contains("const ENTRIES_PER_SHOT: u32 = 4096u;"));
        assert!(source.contains("const MEASUREMENT_STRIDE: u32 = 3u;"));
    }
}
