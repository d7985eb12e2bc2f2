use std::ops::Range;

use cgmath::Matrix4;
use wgpu::{
    BindGroup, BlendComponent, BlendFactor, BlendState, Device, PipelineCompilationOptions,
    PipelineLayoutDescriptor, PrimitiveState, RenderPass, RenderPipeline,
    RenderPipelineDescriptor, TextureFormat, TextureView,
};

use crate::{
    buffers::{DeviceBuffers, assert_population},
    constants::{PARAMS_GROUP, PARTICLE_GROUP, TRIANGLE_VERTICES},
    gpu::{GpuContext, GpuResource},
    projection::Projection,
};

/// Description of the instanced draw issued for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub vertices: Range<u32>,
    pub instances: Range<u32>,
}

impl DrawCall {
    pub fn instanced(population: usize) -> Self {
        Self {
            vertices: 0..TRIANGLE_VERTICES,
            instances: 0..population as u32,
        }
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.end - self.instances.start
    }
}

/// Draws one triangle per particle straight from the device buffers.
pub struct RenderStage {
    pipeline: RenderPipeline,
    projection: Projection,
    projection_bind_group: BindGroup,
    len: usize,
    draws: u64,
}

impl RenderStage {
    pub fn new(
        ctx: &GpuContext,
        buffers: &DeviceBuffers,
        texture_format: TextureFormat,
    ) -> anyhow::Result<Self> {
        let projection = Projection::new(ctx)?;
        let projection_layout = ctx
            .device
            .create_bind_group_layout(&Projection::bind_group_layout());
        let projection_bind_group = projection.create_bind_group(&projection_layout, &ctx.device);

        let pipeline = ctx.create_checked(GpuResource::RenderProgram, |device| {
            Self::create_pipeline(device, texture_format, buffers, &projection_layout)
        })?;
        log::info!("Render program ready for {} instances", buffers.len());

        Ok(Self {
            pipeline,
            projection,
            projection_bind_group,
            len: buffers.len(),
            draws: 0,
        })
    }

    fn create_pipeline(
        device: &Device,
        texture_format: TextureFormat,
        buffers: &DeviceBuffers,
        projection_layout: &wgpu::BindGroupLayout,
    ) -> RenderPipeline {
        let shader_module =
            device.create_shader_module(wgpu::include_wgsl!("../../shaders/instanced.wgsl"));

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("instanced pipeline layout"),
            bind_group_layouts: &[buffers.render_layout(), projection_layout],
            push_constant_ranges: &[],
        });

        device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("instanced pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader_module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: PipelineCompilationOptions::default(),
            },
            cache: None,
            primitive: PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(BlendState {
                        color: BlendComponent {
                            src_factor: BlendFactor::SrcAlpha,
                            dst_factor: BlendFactor::OneMinusSrcAlpha,
                            operation: wgpu::BlendOperation::Add,
                        },
                        alpha: BlendComponent::OVER,
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: PipelineCompilationOptions::default(),
            }),
            multiview: None,
        })
    }

    pub fn set_projection(&mut self, matrix: Matrix4<f32>) {
        self.projection.set(matrix);
    }

    /// Upload pending parameter changes. Call before recording into a caller owned pass.
    pub fn prepare(&mut self, queue: &wgpu::Queue) {
        self.projection.flush_if_needed(queue);
    }

    /// Record the instanced draw into a pass the caller owns.
    ///
    /// Panics if `buffers` does not hold the population the program was built for.
    pub fn record(&mut self, rpass: &mut RenderPass<'_>, buffers: &DeviceBuffers) -> DrawCall {
        assert_population(self.len, buffers.len());
        let call = DrawCall::instanced(self.len);

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(PARTICLE_GROUP, buffers.render_bind_group(), &[]);
        rpass.set_bind_group(PARAMS_GROUP, &self.projection_bind_group, &[]);
        rpass.draw(call.vertices.clone(), call.instances.clone());

        self.draws += 1;
        call
    }

    /// Clear `target` and draw every particle into it.
    pub fn draw(
        &mut self,
        ctx: &GpuContext,
        buffers: &DeviceBuffers,
        target: &TextureView,
    ) -> DrawCall {
        assert_population(self.len, buffers.len());
        self.prepare(&ctx.queue);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("particle render"),
            });
        let call = {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("particles"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
            self.record(&mut rpass, buffers)
        };
        ctx.queue.submit(Some(encoder.finish()));
        call
    }

    /// Number of particles each draw covers.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of instanced draws issued so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

#[cfg(test)]
mod tests {
    use std::panic::AssertUnwindSafe;

    use super::*;
    use crate::{constants::TARGET_FORMAT, gpu::test_context, particles::ParticleStore};

    fn target(ctx: &GpuContext) -> TextureView {
        ctx.device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("render stage test target"),
                size: wgpu::Extent3d {
                    width: 8,
                    height: 8,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    #[test]
    fn draw_rejects_buffers_of_another_population() {
        let Some(ctx) = test_context() else { return };
        let buffers = DeviceBuffers::new(&ctx, &ParticleStore::new(64)).unwrap();
        let smaller = DeviceBuffers::new(&ctx, &ParticleStore::new(4)).unwrap();
        let mut stage = RenderStage::new(&ctx, &buffers, TARGET_FORMAT).unwrap();
        let view = target(&ctx);

        let rejected = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = stage.draw(&ctx, &smaller, &view);
        }));
        assert!(rejected.is_err());
        assert_eq!(stage.draws(), 0);

        let call = stage.draw(&ctx, &buffers, &view);
        assert_eq!(call.instance_count(), 64);
        assert_eq!(stage.len(), 64);
        assert_eq!(stage.draws(), 1);
    }

    #[test]
    fn one_triangle_per_particle() {
        for population in [1, 4, 524_288] {
            let call = DrawCall::instanced(population);
            assert_eq!(call.vertices, 0..3);
            assert_eq!(call.instance_count() as usize, population);
        }
    }
}
