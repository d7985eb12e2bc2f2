use cgmath::{Matrix4, SquareMatrix};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, Buffer, BufferDescriptor, BufferUsages, Device, Queue,
};

use crate::gpu::{GpuContext, GpuResource};

/// cgmath builds OpenGL clip space (z in -1..1); wgpu expects z in 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Orthographic view of `-half_height..half_height` vertically, widened by `aspect`.
pub fn orthographic(half_height: f32, aspect: f32) -> Matrix4<f32> {
    let half_width = half_height * aspect;
    OPENGL_TO_WGPU_MATRIX
        * cgmath::ortho(-half_width, half_width, -half_height, half_height, -1.0, 1.0)
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ProjectionUniform {
    matrix: [[f32; 4]; 4],
}

/// The render program's projection parameter. Changes are uploaded lazily before the next draw.
pub struct Projection {
    matrix: Matrix4<f32>,
    changed: bool,
    buffer: Buffer,
}

impl Projection {
    pub fn new(ctx: &GpuContext) -> anyhow::Result<Self> {
        let buffer = ctx.create_checked(GpuResource::ProjectionBuffer, |device| {
            device.create_buffer(&BufferDescriptor {
                label: Some("projection buffer"),
                size: size_of::<ProjectionUniform>() as u64,
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;

        Ok(Self {
            matrix: Matrix4::identity(),
            changed: true,
            buffer,
        })
    }

    pub fn set(&mut self, matrix: Matrix4<f32>) {
        if self.matrix != matrix {
            self.matrix = matrix;
            self.changed = true;
        }
    }

    pub fn flush_if_needed(&mut self, queue: &Queue) {
        if !self.changed {
            return;
        }
        self.changed = false;

        let uniform = ProjectionUniform {
            matrix: self.matrix.into(),
        };
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&uniform));
    }

    pub fn bind_group_layout() -> BindGroupLayoutDescriptor<'static> {
        BindGroupLayoutDescriptor {
            label: Some("projection layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        }
    }

    pub fn create_bind_group(&self, layout: &BindGroupLayout, device: &Device) -> BindGroup {
        device.create_bind_group(&BindGroupDescriptor {
            label: Some("projection bindings"),
            layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: self.buffer.as_entire_binding(),
            }],
        })
    }
}
