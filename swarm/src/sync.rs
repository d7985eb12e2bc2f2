use std::time::Instant;

use anyhow::{anyhow, bail};
use bytemuck::Pod;
use futures::channel::oneshot;
use wgpu::{Buffer, BufferAsyncError, BufferDescriptor, BufferUsages, MapMode, PollType};

use crate::{
    buffers::DeviceBuffers,
    gpu::{GpuContext, GpuResource},
    particles::{Particle, ParticleStore, Transform},
};

/// Read mapping of a staging buffer. Unmaps on drop, whether or not the map completed,
/// so no exit path can leave the buffer mapped.
struct StagingMap<'a> {
    buffer: &'a Buffer,
    receiver: oneshot::Receiver<Result<(), BufferAsyncError>>,
    mapped: bool,
}

impl<'a> StagingMap<'a> {
    fn request(buffer: &'a Buffer) -> Self {
        let (sender, receiver) = oneshot::channel();
        buffer.slice(..).map_async(MapMode::Read, move |result| {
            // The receiver only goes away together with the map, so there is nobody to tell.
            let _ = sender.send(result);
        });
        Self {
            buffer,
            receiver,
            mapped: true,
        }
    }

    /// Check the map callback fired successfully. Only valid after the device was polled.
    fn ready(&mut self) -> anyhow::Result<()> {
        match self.receiver.try_recv() {
            Ok(Some(Ok(()))) => Ok(()),
            Ok(Some(Err(err))) => {
                self.mapped = false;
                Err(anyhow!("Failed to map {}: {err}", GpuResource::StagingBuffer))
            }
            Ok(None) => bail!("{} was not mapped after the copy completed", GpuResource::StagingBuffer),
            Err(_) => {
                self.mapped = false;
                bail!("{} map request was dropped", GpuResource::StagingBuffer)
            }
        }
    }

    fn copy_into<T: Pod>(&self, dst: &mut [T]) {
        let view = self.buffer.slice(..).get_mapped_range();
        let dst: &mut [u8] = bytemuck::cast_slice_mut(dst);
        dst.copy_from_slice(&view[..dst.len()]);
    }
}

impl Drop for StagingMap<'_> {
    fn drop(&mut self) {
        if self.mapped {
            self.buffer.unmap();
        }
    }
}

/// Mirrors device state into a [`ParticleStore`] on request.
///
/// Staging buffers are allocated once, so a pull costs two copies and a host wait but
/// no allocation.
pub struct HostSync {
    particle_staging: Buffer,
    transform_staging: Buffer,
    len: usize,
    pulls: u64,
}

impl HostSync {
    pub fn new(ctx: &GpuContext, buffers: &DeviceBuffers) -> anyhow::Result<Self> {
        let staging = |label, size| {
            ctx.create_checked(GpuResource::StagingBuffer, |device| {
                device.create_buffer(&BufferDescriptor {
                    label: Some(label),
                    size,
                    usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
        };

        Ok(Self {
            particle_staging: staging("particle staging", buffers.particles().size())?,
            transform_staging: staging("transform staging", buffers.transforms().size())?,
            len: buffers.len(),
            pulls: 0,
        })
    }

    /// Copy all particles and transforms from the device into `store`, blocking until done.
    ///
    /// The copy is queued behind every dispatch submitted before it, so it always sees the
    /// latest kernel writes. Either both mirrors are overwritten completely or neither is
    /// touched and an error is returned.
    pub fn pull(
        &mut self,
        ctx: &GpuContext,
        buffers: &DeviceBuffers,
        store: &mut ParticleStore,
    ) -> anyhow::Result<()> {
        assert_eq!(store.len(), self.len, "host mirror does not match the device population");
        assert_eq!(buffers.len(), self.len, "staging does not match the device population");

        let start = Instant::now();
        let particle_bytes = self.len as u64 * Particle::size();
        let transform_bytes = self.len as u64 * Transform::size();

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("host sync"),
            });
        encoder.copy_buffer_to_buffer(
            buffers.particles(),
            0,
            &self.particle_staging,
            0,
            particle_bytes,
        );
        encoder.copy_buffer_to_buffer(
            buffers.transforms(),
            0,
            &self.transform_staging,
            0,
            transform_bytes,
        );
        let submission = ctx.queue.submit(Some(encoder.finish()));

        let particles = StagingMap::request(&self.particle_staging);
        let transforms = StagingMap::request(&self.transform_staging);
        ctx.device
            .poll(PollType::WaitForSubmissionIndex(submission))?;
        Self::complete(particles, transforms, store)?;

        self.pulls += 1;
        log::debug!("Pulled {} particles in {:?}", self.len, start.elapsed());
        Ok(())
    }

    /// Copy both maps into `store` once both have landed. The guards unmap on every path.
    fn complete(
        mut particles: StagingMap<'_>,
        mut transforms: StagingMap<'_>,
        store: &mut ParticleStore,
    ) -> anyhow::Result<()> {
        particles.ready()?;
        transforms.ready()?;

        particles.copy_into(store.particles_mut());
        transforms.copy_into(store.transforms_mut());
        Ok(())
    }

    pub fn pulls(&self) -> u64 {
        self.pulls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{gpu::test_context, seed::Disc};

    fn seeded(len: usize) -> ParticleStore {
        let mut store = ParticleStore::new(len);
        Disc::default().fill(&mut store);
        store
    }

    /// A map whose callback will never report success.
    fn abandoned(buffer: &Buffer) -> StagingMap<'_> {
        let (_, receiver) = oneshot::channel();
        StagingMap {
            buffer,
            receiver,
            mapped: false,
        }
    }

    #[test]
    fn dropped_map_leaves_the_buffer_mappable() {
        let Some(ctx) = test_context() else { return };
        let store = seeded(32);
        let buffers = DeviceBuffers::new(&ctx, &store).unwrap();
        let sync = HostSync::new(&ctx, &buffers).unwrap();

        drop(StagingMap::request(&sync.particle_staging));

        let mut map = StagingMap::request(&sync.particle_staging);
        ctx.device.poll(PollType::Wait).unwrap();
        map.ready().unwrap();
    }

    #[test]
    fn failed_map_leaves_the_mirror_untouched() {
        let Some(ctx) = test_context() else { return };
        let device_state = seeded(256);
        let buffers = DeviceBuffers::new(&ctx, &device_state).unwrap();
        let mut sync = HostSync::new(&ctx, &buffers).unwrap();
        let mut store = ParticleStore::new(256);
        let before = store.clone();

        let particles = StagingMap::request(&sync.particle_staging);
        ctx.device.poll(PollType::Wait).unwrap();
        let transforms = abandoned(&sync.transform_staging);
        assert!(HostSync::complete(particles, transforms, &mut store).is_err());

        assert_eq!(
            bytemuck::cast_slice::<Particle, u8>(store.particles()),
            bytemuck::cast_slice::<Particle, u8>(before.particles())
        );
        assert_eq!(store.transforms(), before.transforms());

        // Both staging buffers were released, so the next pull can copy into them.
        sync.pull(&ctx, &buffers, &mut store).unwrap();
        assert_eq!(store.particles(), device_state.particles());
        assert_eq!(store.transforms(), device_state.transforms());
        assert_eq!(sync.pulls(), 1);
    }

    #[test]
    fn pull_into_a_mirror_of_another_size_panics() {
        let Some(ctx) = test_context() else { return };
        let buffers = DeviceBuffers::new(&ctx, &seeded(16)).unwrap();
        let mut sync = HostSync::new(&ctx, &buffers).unwrap();
        let mut store = ParticleStore::new(8);

        let rejected = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = sync.pull(&ctx, &buffers, &mut store);
        }));
        assert!(rejected.is_err());
        assert_eq!(sync.pulls(), 0);
    }
}
