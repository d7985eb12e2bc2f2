use cgmath::Matrix4;
use wgpu::{TextureFormat, TextureView};

use crate::{
    buffers::DeviceBuffers,
    gpu::GpuContext,
    kernel::{Barrier, ComputeStage},
    parameters::SimParameters,
    particles::ParticleStore,
    pipeline::{DrawCall, RenderStage},
    sync::HostSync,
};

/// One simulation: the population, its device buffers and the programs reading them.
///
/// Per tick the caller runs `dispatch`, optionally `pull`, then `draw`. Skipping `dispatch`
/// freezes the simulation while drawing continues.
pub struct ParticleSystem {
    // Declaration order is drop order: programs go before the buffers they bind.
    render: RenderStage,
    compute: ComputeStage,
    host_sync: HostSync,
    buffers: DeviceBuffers,
    store: ParticleStore,
    last_barrier: Option<Barrier>,
    ctx: GpuContext,
}

impl ParticleSystem {
    /// Upload `store` and build both programs. Any failure here is fatal for the simulation
    /// and the error names the resource that could not be created.
    pub fn new(
        ctx: &GpuContext,
        store: ParticleStore,
        params: &SimParameters,
        target_format: TextureFormat,
    ) -> anyhow::Result<Self> {
        assert_eq!(
            store.len(),
            params.population,
            "particle store and parameters disagree on the population size"
        );
        let partition = params.validate(&ctx.limits())?;

        let buffers = DeviceBuffers::new(ctx, &store)?;
        let compute = ComputeStage::new(ctx, &buffers, &params.kernel, partition, params.time_step)?;
        let host_sync = HostSync::new(ctx, &buffers)?;
        let render = RenderStage::new(ctx, &buffers, target_format)?;

        Ok(Self {
            render,
            compute,
            host_sync,
            buffers,
            store,
            last_barrier: None,
            ctx: ctx.clone(),
        })
    }

    /// Advance the population by one tick on the device.
    pub fn dispatch(&mut self) -> Barrier {
        let barrier = self.compute.dispatch(&self.ctx, &self.buffers);
        self.last_barrier = Some(barrier.clone());
        barrier
    }

    /// Mirror device state into the host store, blocking until the copy is complete.
    pub fn pull(&mut self) -> anyhow::Result<&ParticleStore> {
        self.host_sync
            .pull(&self.ctx, &self.buffers, &mut self.store)?;
        Ok(&self.store)
    }

    /// Draw every particle into `target` from device state. Never touches the host mirror.
    pub fn draw(&mut self, target: &TextureView) -> DrawCall {
        self.render.draw(&self.ctx, &self.buffers, target)
    }

    /// Block until the most recent dispatch has finished on the device.
    pub fn wait(&self) -> anyhow::Result<()> {
        match &self.last_barrier {
            Some(barrier) => barrier.wait(&self.ctx.device),
            None => Ok(()),
        }
    }

    pub fn set_projection(&mut self, matrix: Matrix4<f32>) {
        self.render.set_projection(matrix);
    }

    pub fn set_time_step(&mut self, time_step: f32) {
        self.compute.set_time_step(&self.ctx, time_step);
    }

    /// Host mirror as of the last `pull`, or the initial upload if there was none.
    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn buffers(&self) -> &DeviceBuffers {
        &self.buffers
    }

    pub fn compute(&self) -> &ComputeStage {
        &self.compute
    }

    pub fn render(&self) -> &RenderStage {
        &self.render
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn ticks(&self) -> u64 {
        self.compute.dispatches()
    }

    pub fn pulls(&self) -> u64 {
        self.host_sync.pulls()
    }

    /// Tear the simulation down, releasing programs before buffers, and hand back the
    /// host mirror.
    pub fn destroy(self) -> ParticleStore {
        let Self {
            render,
            compute,
            host_sync,
            buffers,
            store,
            ..
        } = self;
        drop(render);
        drop(compute);
        drop(host_sync);
        buffers.destroy();
        store
    }
}
