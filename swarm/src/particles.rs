use cgmath::{Matrix4, Point3, Vector3};
use rayon::iter::{
    IndexedParallelIterator, IntoParallelRefIterator, IntoParallelRefMutIterator, ParallelIterator,
};

pub type Vec3 = [f32; 3];

/// State of one simulated particle, laid out exactly like the WGSL `Particle` struct.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Particle {
    pub position: Vec3,
    /// Edge length of the drawn triangle.
    pub scale: f32,
    pub velocity: Vec3,
    pub mass: f32,
}

impl Particle {
    pub const fn size() -> u64 {
        size_of::<Particle>() as u64
    }
}

/// Column-major 4x4 matrix placing one particle's triangle, `mat4x4<f32>` in WGSL.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Transform {
    pub columns: [[f32; 4]; 4],
}

impl Transform {
    pub const fn size() -> u64 {
        size_of::<Transform>() as u64
    }

    /// Translate to the particle position, scaled by the particle scale. This is the
    /// derivation both bundled kernels use.
    pub fn placing(particle: &Particle) -> Self {
        let position: Vector3<f32> = particle.position.into();
        (Matrix4::from_translation(position) * Matrix4::from_scale(particle.scale)).into()
    }

    pub fn translation(&self) -> Vec3 {
        let [x, y, z, _] = self.columns[3];
        [x, y, z]
    }
}

impl From<Matrix4<f32>> for Transform {
    fn from(value: Matrix4<f32>) -> Self {
        Self {
            columns: value.into(),
        }
    }
}

/// Axis aligned box around every particle position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Bounds {
    fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    fn include(mut self, p: &Vec3) -> Self {
        self.min = Point3::new(self.min.x.min(p[0]), self.min.y.min(p[1]), self.min.z.min(p[2]));
        self.max = Point3::new(self.max.x.max(p[0]), self.max.y.max(p[1]), self.max.z.max(p[2]));
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }
}

/// Host mirror of the population. The length is fixed at construction; only the
/// contents can change.
#[derive(Clone)]
pub struct ParticleStore {
    particles: Box<[Particle]>,
    transforms: Box<[Transform]>,
}

impl ParticleStore {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "a particle population needs at least one particle");
        Self {
            particles: vec![Particle::default(); size].into_boxed_slice(),
            transforms: vec![Transform::default(); size].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn transforms_mut(&mut self) -> &mut [Transform] {
        &mut self.transforms
    }

    /// Recompute every transform from the current particle state on the host.
    pub fn derive_transforms(&mut self) {
        self.transforms
            .par_iter_mut()
            .zip(self.particles.par_iter())
            .for_each(|(transform, particle)| *transform = Transform::placing(particle));
    }

    pub fn bounds(&self) -> Bounds {
        self.particles
            .par_iter()
            .fold(Bounds::empty, |bounds, p| bounds.include(&p.position))
            .reduce(Bounds::empty, Bounds::merge)
    }
}
