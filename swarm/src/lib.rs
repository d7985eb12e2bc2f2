pub mod buffers;
pub mod constants;
pub mod gpu;
pub mod kernel;
pub mod parameters;
pub mod particles;
pub mod pipeline;
pub mod projection;
pub mod seed;
pub mod sync;
mod system;
pub mod ui;

use bytemuck::{Pod, Zeroable};

pub use buffers::DeviceBuffers;
pub use gpu::{GpuContext, GpuResource};
pub use kernel::{Barrier, ComputeStage, KernelSource, WorkPartition};
pub use parameters::SimParameters;
pub use particles::{Particle, ParticleStore, Transform};
pub use pipeline::{DrawCall, RenderStage};
pub use sync::HostSync;
pub use system::ParticleSystem;

/// Uniform read by every kernel, `KernelParams` in WGSL.
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct KernelParams {
    pub count: u32,
    pub stride: u32,
    pub time_step: f32,
    pub _padding: u32,
}
