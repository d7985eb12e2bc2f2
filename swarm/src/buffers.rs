use wgpu::{
    BindGroup, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, Buffer,
    BufferUsages, ShaderStages,
    util::{BufferInitDescriptor, DeviceExt},
};

use crate::{
    constants::{PARTICLE_SLOT, TRANSFORM_SLOT},
    gpu::{GpuContext, GpuResource},
    particles::{Particle, ParticleStore, Transform},
};

/// Device side particle and transform storage, bound at the slots both programs share.
///
/// Owned by exactly one simulation. `destroy` consumes the binder, so buffers cannot be
/// released twice or used after release.
pub struct DeviceBuffers {
    particles: Buffer,
    transforms: Buffer,
    compute_layout: BindGroupLayout,
    compute_bind_group: BindGroup,
    render_layout: BindGroupLayout,
    render_bind_group: BindGroup,
    len: usize,
}

fn storage_entry(binding: u32, visibility: ShaderStages, read_only: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Every stage is built for one population and must only ever see buffers of that size.
pub(crate) fn assert_population(expected: usize, actual: usize) {
    assert_eq!(
        expected, actual,
        "stage built for {expected} particles was handed buffers of {actual}"
    );
}

impl DeviceBuffers {
    /// Create both buffers, seed them from `store` and bind them at slots 0 and 1.
    pub fn new(ctx: &GpuContext, store: &ParticleStore) -> anyhow::Result<Self> {
        let len = store.len();
        let usage = BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST;

        ctx.check_storage_size(GpuResource::ParticleBuffer, len as u64 * Particle::size())?;
        let particles = ctx.create_checked(GpuResource::ParticleBuffer, |device| {
            device.create_buffer_init(&BufferInitDescriptor {
                label: Some("particle buffer"),
                contents: bytemuck::cast_slice(store.particles()),
                usage,
            })
        })?;

        ctx.check_storage_size(GpuResource::TransformBuffer, len as u64 * Transform::size())?;
        let transforms = ctx.create_checked(GpuResource::TransformBuffer, |device| {
            device.create_buffer_init(&BufferInitDescriptor {
                label: Some("transform buffer"),
                contents: bytemuck::cast_slice(store.transforms()),
                usage,
            })
        })?;

        let compute_layout = ctx.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("particle compute layout"),
            entries: &[
                storage_entry(PARTICLE_SLOT, ShaderStages::COMPUTE, false),
                storage_entry(TRANSFORM_SLOT, ShaderStages::COMPUTE, false),
            ],
        });
        // Vertex shaders may only read storage buffers.
        let render_layout = ctx.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("particle render layout"),
            entries: &[
                storage_entry(PARTICLE_SLOT, ShaderStages::VERTEX, true),
                storage_entry(TRANSFORM_SLOT, ShaderStages::VERTEX, true),
            ],
        });

        let compute_bind_group =
            Self::bind(ctx, "particle compute bindings", &compute_layout, &particles, &transforms);
        let render_bind_group =
            Self::bind(ctx, "particle render bindings", &render_layout, &particles, &transforms);

        log::info!(
            "Uploaded {len} particles ({} + {} bytes)",
            particles.size(),
            transforms.size()
        );

        Ok(Self {
            particles,
            transforms,
            compute_layout,
            compute_bind_group,
            render_layout,
            render_bind_group,
            len,
        })
    }

    fn bind(
        ctx: &GpuContext,
        label: &str,
        layout: &BindGroupLayout,
        particles: &Buffer,
        transforms: &Buffer,
    ) -> BindGroup {
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: PARTICLE_SLOT,
                    resource: particles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: TRANSFORM_SLOT,
                    resource: transforms.as_entire_binding(),
                },
            ],
        })
    }

    /// Number of records in each buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn particles(&self) -> &Buffer {
        &self.particles
    }

    pub fn transforms(&self) -> &Buffer {
        &self.transforms
    }

    pub fn compute_layout(&self) -> &BindGroupLayout {
        &self.compute_layout
    }

    pub fn compute_bind_group(&self) -> &BindGroup {
        &self.compute_bind_group
    }

    pub fn render_layout(&self) -> &BindGroupLayout {
        &self.render_layout
    }

    pub fn render_bind_group(&self) -> &BindGroup {
        &self.render_bind_group
    }

    /// Release both buffers now rather than when the last reference drops.
    pub fn destroy(self) {
        log::info!("Destroying particle buffers ({} particles)", self.len);
        drop(self.compute_bind_group);
        drop(self.render_bind_group);
        self.particles.destroy();
        self.transforms.destroy();
    }
}
