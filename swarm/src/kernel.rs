//! Compute stage: runs the injected physics kernel over the whole population once per tick.
//!
//! Kernel contract:
//!
//! | Group | Binding | Type                 | Contents             |
//! |-------|---------|----------------------|----------------------|
//! | 0     | 0       | Storage (read_write) | `array<Particle>`    |
//! | 0     | 1       | Storage (read_write) | `array<mat4x4<f32>>` |
//! | 1     | 0       | Uniform              | `KernelParams`       |
//!
//! The entry point must declare `@workgroup_size(64)` and walk the population with
//! `for (var i = gid.x; i < params.count; i += params.stride)`, which touches every
//! particle exactly once no matter how many work groups are dispatched.

use std::{borrow::Cow, fmt::Display};

use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, ComputePipeline, Device, Limits, PollType,
    SubmissionIndex, util::DeviceExt,
};

use crate::{
    KernelParams,
    buffers::{DeviceBuffers, assert_population},
    constants::{PARAMS_GROUP, PARTICLE_GROUP, WORKGROUP_SIZE},
    gpu::{GpuContext, GpuResource},
};

/// WGSL source of a physics kernel honouring the binding contract above.
#[derive(Debug, Clone)]
pub struct KernelSource {
    pub label: Cow<'static, str>,
    pub wgsl: Cow<'static, str>,
    pub entry_point: Cow<'static, str>,
}

impl KernelSource {
    pub fn wgsl(label: impl Into<Cow<'static, str>>, wgsl: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            wgsl: wgsl.into(),
            entry_point: Cow::Borrowed("main"),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<Cow<'static, str>>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Harmonic pull towards the origin, integrated with semi-implicit Euler.
    pub fn ballistic() -> Self {
        Self::wgsl("ballistic", include_str!("../../shaders/ballistic.wgsl"))
    }

    /// Leaves particles where they are and only refreshes their transforms.
    pub fn stationary() -> Self {
        Self::wgsl("stationary", include_str!("../../shaders/stationary.wgsl"))
    }
}

/// How a population of `count` particles is spread over `groups` work groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPartition {
    groups: u32,
    count: u32,
}

impl WorkPartition {
    pub fn new(groups: u32, count: u32) -> Self {
        assert!(groups > 0, "a dispatch needs at least one work group");
        Self { groups, count }
    }

    pub fn groups(&self) -> u32 {
        self.groups
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Total invocations per dispatch, which is also the kernel's loop stride.
    pub fn stride(&self) -> u32 {
        self.groups * WORKGROUP_SIZE
    }

    /// Upper bound of loop iterations any single invocation runs.
    pub fn particles_per_invocation(&self) -> u32 {
        self.count.div_ceil(self.stride())
    }

    pub(crate) fn params(&self, time_step: f32) -> KernelParams {
        KernelParams {
            count: self.count,
            stride: self.stride(),
            time_step,
            _padding: 0,
        }
    }
}

/// Compute limits of the device, reported once at init.
#[derive(Debug, Clone, Copy)]
pub struct ComputeCapabilities {
    pub max_work_group_count: u32,
    pub max_work_group_size: [u32; 3],
    pub max_invocations_per_work_group: u32,
}

impl From<&Limits> for ComputeCapabilities {
    fn from(limits: &Limits) -> Self {
        Self {
            max_work_group_count: limits.max_compute_workgroups_per_dimension,
            max_work_group_size: [
                limits.max_compute_workgroup_size_x,
                limits.max_compute_workgroup_size_y,
                limits.max_compute_workgroup_size_z,
            ],
            max_invocations_per_work_group: limits.max_compute_invocations_per_workgroup,
        }
    }
}

impl Display for ComputeCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [x, y, z] = self.max_work_group_size;
        write!(
            f,
            "max work groups per dimension: {}, max work group size: {x}x{y}x{z}, max invocations per work group: {}",
            self.max_work_group_count, self.max_invocations_per_work_group
        )
    }
}

/// Proof that a dispatch was submitted. Anything recorded on the same queue afterwards
/// observes the kernel's writes; `wait` additionally blocks the host until they land.
#[must_use = "a barrier is the only way to know the kernel writes have landed"]
#[derive(Debug, Clone)]
pub struct Barrier {
    submission: SubmissionIndex,
}

impl Barrier {
    pub fn wait(&self, device: &Device) -> anyhow::Result<()> {
        device.poll(PollType::WaitForSubmissionIndex(self.submission.clone()))?;
        Ok(())
    }
}

pub struct ComputeStage {
    pipeline: ComputePipeline,
    params_buffer: Buffer,
    params_bind_group: BindGroup,
    partition: WorkPartition,
    time_step: f32,
    dispatches: u64,
}

impl ComputeStage {
    pub fn new(
        ctx: &GpuContext,
        buffers: &DeviceBuffers,
        kernel: &KernelSource,
        partition: WorkPartition,
        time_step: f32,
    ) -> anyhow::Result<Self> {
        assert_population(partition.count() as usize, buffers.len());
        log::info!("Compute capabilities: {}", ComputeCapabilities::from(&ctx.limits()));

        let params_layout = ctx
            .device
            .create_bind_group_layout(&Self::params_layout_descriptor());
        let params_buffer = ctx.create_checked(GpuResource::ParamsBuffer, |device| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kernel params"),
                contents: bytemuck::bytes_of(&partition.params(time_step)),
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            })
        })?;
        let params_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel params"),
            layout: &params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let pipeline = ctx.create_checked(GpuResource::ComputeProgram, |device| {
            Self::create_pipeline(device, kernel, buffers.compute_layout(), &params_layout)
        })?;
        log::info!(
            "Compute program '{}' ready: {} groups of {} over {} particles",
            kernel.label,
            partition.groups(),
            WORKGROUP_SIZE,
            partition.count()
        );

        Ok(Self {
            pipeline,
            params_buffer,
            params_bind_group,
            partition,
            time_step,
            dispatches: 0,
        })
    }

    fn params_layout_descriptor() -> wgpu::BindGroupLayoutDescriptor<'static> {
        wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel params layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        }
    }

    fn create_pipeline(
        device: &Device,
        kernel: &KernelSource,
        particle_layout: &BindGroupLayout,
        params_layout: &BindGroupLayout,
    ) -> ComputePipeline {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.label.as_ref()),
            source: wgpu::ShaderSource::Wgsl(kernel.wgsl.clone()),
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compute pipeline layout"),
            bind_group_layouts: &[particle_layout, params_layout],
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.label.as_ref()),
            layout: Some(&layout),
            module: &module,
            entry_point: Some(kernel.entry_point.as_ref()),
            compilation_options: Default::default(),
            cache: None,
        })
    }

    /// Record and submit one pass of the kernel over the whole population.
    ///
    /// Panics if `buffers` does not hold the population the partition was built for.
    pub fn dispatch(&mut self, ctx: &GpuContext, buffers: &DeviceBuffers) -> Barrier {
        assert_population(self.partition.count() as usize, buffers.len());
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("particle compute"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("particle physics"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(PARTICLE_GROUP, buffers.compute_bind_group(), &[]);
            cpass.set_bind_group(PARAMS_GROUP, &self.params_bind_group, &[]);
            cpass.dispatch_workgroups(self.partition.groups(), 1, 1);
        }
        // Ending the pass before submission makes every storage write visible to later
        // commands on this queue.
        let submission = ctx.queue.submit(Some(encoder.finish()));
        self.dispatches += 1;
        Barrier { submission }
    }

    pub fn set_time_step(&mut self, ctx: &GpuContext, time_step: f32) {
        self.time_step = time_step;
        ctx.queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&self.partition.params(time_step)),
        );
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    pub fn partition(&self) -> WorkPartition {
        self.partition
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }
}

#[cfg(test)]
mod tests {
    use std::panic::AssertUnwindSafe;

    use super::*;
    use crate::particles::ParticleStore;

    /// Indices one invocation visits, mirroring the kernel loop.
    fn indices_of(partition: &WorkPartition, invocation: u32) -> impl Iterator<Item = u32> {
        (invocation..partition.count()).step_by(partition.stride() as usize)
    }

    fn visits(partition: &WorkPartition) -> Vec<u32> {
        let mut seen = vec![0u32; partition.count() as usize];
        for invocation in 0..partition.stride() {
            for idx in indices_of(partition, invocation) {
                seen[idx as usize] += 1;
            }
        }
        seen
    }

    #[test]
    fn every_particle_is_visited_exactly_once() {
        for (groups, count) in [(1, 1), (1, 64), (2, 65), (3, 1000), (128, 4), (128, 20_000)] {
            let partition = WorkPartition::new(groups, count);
            assert!(
                visits(&partition).iter().all(|&n| n == 1),
                "{groups} groups over {count} particles"
            );
        }
    }

    #[test]
    fn stride_and_loop_bound() {
        let partition = WorkPartition::new(128, 524_288);
        assert_eq!(partition.stride(), 8192);
        assert_eq!(partition.particles_per_invocation(), 64);

        let partition = WorkPartition::new(128, 4);
        assert_eq!(partition.particles_per_invocation(), 1);
        assert_eq!(indices_of(&partition, 4).count(), 0);
    }

    #[test]
    fn params_carry_the_partition() {
        let params = WorkPartition::new(3, 100).params(0.5);
        assert_eq!(params.count, 100);
        assert_eq!(params.stride, 192);
        assert_eq!(params.time_step, 0.5);
        assert_eq!(size_of::<KernelParams>(), 16);
    }

    #[test]
    #[should_panic(expected = "at least one work group")]
    fn empty_partition_panics() {
        let _ = WorkPartition::new(0, 10);
    }

    #[test]
    fn capabilities_report_limits() {
        let caps = ComputeCapabilities::from(&Limits::default());
        let report = caps.to_string();
        assert!(report.contains("max work groups per dimension: 65535"));
        assert!(report.contains("256x256x64"));
    }

    #[test]
    fn dispatch_rejects_buffers_of_another_population() {
        let Some(ctx) = crate::gpu::test_context() else { return };
        let buffers = DeviceBuffers::new(&ctx, &ParticleStore::new(64)).unwrap();
        let smaller = DeviceBuffers::new(&ctx, &ParticleStore::new(4)).unwrap();
        let mut stage = ComputeStage::new(
            &ctx,
            &buffers,
            &KernelSource::stationary(),
            WorkPartition::new(1, 64),
            0.0,
        )
        .unwrap();

        let rejected = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = stage.dispatch(&ctx, &smaller);
        }));
        assert!(rejected.is_err());
        assert_eq!(stage.dispatches(), 0);

        stage.dispatch(&ctx, &buffers).wait(&ctx.device).unwrap();
        assert_eq!(stage.dispatches(), 1);
    }

    #[test]
    fn bundled_kernels_use_main() {
        for kernel in [KernelSource::ballistic(), KernelSource::stationary()] {
            assert_eq!(kernel.entry_point, "main");
            assert!(kernel.wgsl.contains("@workgroup_size(64)"));
            assert!(kernel.wgsl.contains("fn main"));
        }
    }
}
