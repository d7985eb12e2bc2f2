// POPULATION
/// Number of particles in the production configuration.
pub const DEFAULT_POPULATION: usize = 524_288;
/// Radius of the disc the default seeding spreads particles over, in world units.
pub const DEFAULT_SEED_RADIUS: f32 = 1.0;
/// Edge length of the triangle drawn for every particle, in world units.
pub const DEFAULT_PARTICLE_SCALE: f32 = 0.0025;

// COMPUTE
/// Invocations per work group. Every kernel must declare `@workgroup_size(64)`.
pub const WORKGROUP_SIZE: u32 = 64;
/// Number of work groups a dispatch is split into.
pub const DEFAULT_WORK_GROUPS: u32 = 128;
/// Simulated seconds advanced by one dispatch.
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 240.0;

// BINDINGS
/// Slot of the particle state buffer, shared by compute and render programs.
pub const PARTICLE_SLOT: u32 = 0;
/// Slot of the transform buffer, shared by compute and render programs.
pub const TRANSFORM_SLOT: u32 = 1;
/// Bind group holding the particle and transform slots.
pub const PARTICLE_GROUP: u32 = 0;
/// Bind group holding stage specific parameters: kernel params or the projection.
pub const PARAMS_GROUP: u32 = 1;

// RENDER
/// Vertices of the per-instance primitive.
pub const TRIANGLE_VERTICES: u32 = 3;
/// Format the render program writes to.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;
