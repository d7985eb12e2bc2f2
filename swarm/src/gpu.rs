use std::fmt::Display;

use anyhow::{Context, bail};
use pollster::FutureExt;
use wgpu::{Adapter, Device, ErrorFilter, Limits, Queue};

/// Device resources whose creation can fail fatally at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuResource {
    Adapter,
    Device,
    ParticleBuffer,
    TransformBuffer,
    ParamsBuffer,
    StagingBuffer,
    ProjectionBuffer,
    ComputeProgram,
    RenderProgram,
}

impl Display for GpuResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GpuResource::Adapter => "adapter",
            GpuResource::Device => "device",
            GpuResource::ParticleBuffer => "particle buffer",
            GpuResource::TransformBuffer => "transform buffer",
            GpuResource::ParamsBuffer => "kernel parameter buffer",
            GpuResource::StagingBuffer => "staging buffer",
            GpuResource::ProjectionBuffer => "projection buffer",
            GpuResource::ComputeProgram => "compute program",
            GpuResource::RenderProgram => "render program",
        };
        f.write_str(name)
    }
}

/// Device and queue every stage records into. Cheap to clone.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Device,
    pub queue: Queue,
}

impl GpuContext {
    pub fn new(device: Device, queue: Queue) -> Self {
        Self { device, queue }
    }

    /// Create a device without a surface, for tests, benches and offscreen use. Falls back
    /// to a software adapter when no hardware one is available.
    pub async fn headless() -> anyhow::Result<Self> {
        let backends = wgpu::Backends::from_env().unwrap_or(wgpu::Backends::all());
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let mut options = wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        };
        let adapter = match instance.request_adapter(&options).await {
            Ok(adapter) => adapter,
            Err(err) => {
                log::warn!("No hardware adapter ({err}), trying a fallback adapter");
                options.force_fallback_adapter = true;
                instance.request_adapter(&options).await.with_context(|| {
                    format!("Failed to find an appropriate {}", GpuResource::Adapter)
                })?
            }
        };

        Self::from_adapter(&adapter).await
    }

    pub async fn from_adapter(adapter: &Adapter) -> anyhow::Result<Self> {
        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("swarm device"),
                required_features: wgpu::Features::empty(),
                required_limits: Limits::default().using_resolution(adapter.limits()),
                ..Default::default()
            })
            .await
            .with_context(|| format!("Failed to create {}", GpuResource::Device))?;

        Ok(Self { device, queue })
    }

    pub fn limits(&self) -> Limits {
        self.device.limits()
    }

    /// Run `create` inside validation and out-of-memory error scopes, turning any error
    /// reported by the device into a fatal error naming `resource`.
    pub(crate) fn create_checked<T>(
        &self,
        resource: GpuResource,
        create: impl FnOnce(&Device) -> T,
    ) -> anyhow::Result<T> {
        self.device.push_error_scope(ErrorFilter::OutOfMemory);
        self.device.push_error_scope(ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = self.device.pop_error_scope().block_on();
        let out_of_memory = self.device.pop_error_scope().block_on();

        if let Some(err) = validation.or(out_of_memory) {
            bail!("Failed to create {resource}: {err}");
        }
        Ok(value)
    }

    /// Reject buffers the device cannot bind as a single storage binding.
    pub(crate) fn check_storage_size(&self, resource: GpuResource, bytes: u64) -> anyhow::Result<()> {
        let limits = self.limits();
        let max = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
        if bytes > max {
            bail!("Failed to create {resource}: {bytes} bytes exceeds the device limit of {max}");
        }
        Ok(())
    }
}

/// Headless context for device tests, or `None` after announcing the skip on stderr so a
/// machine without any adapter does not pass silently.
#[cfg(test)]
pub(crate) fn test_context() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::headless().block_on() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("SKIPPED: no GPU adapter available: {err:#}");
            None
        }
    }
}
