use std::f32::consts::TAU;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::{iter::IndexedParallelIterator, iter::ParallelIterator, slice::ParallelSliceMut};

use crate::{
    constants::{DEFAULT_PARTICLE_SCALE, DEFAULT_SEED_RADIUS},
    particles::{Particle, ParticleStore},
};

const CHUNK: usize = 4096;

/// Uniform disc in the z = 0 plane, every particle moving on a circular orbit around
/// the origin for the ballistic kernel's unit stiffness.
#[derive(Debug, Clone, Copy)]
pub struct Disc {
    pub radius: f32,
    pub scale: f32,
    pub seed: u64,
}

impl Default for Disc {
    fn default() -> Self {
        Self {
            radius: DEFAULT_SEED_RADIUS,
            scale: DEFAULT_PARTICLE_SCALE,
            seed: 0x5eed,
        }
    }
}

impl Disc {
    fn particle(&self, rng: &mut impl Rng) -> Particle {
        // sqrt keeps the density uniform over the area.
        let r = self.radius * rng.random::<f32>().sqrt();
        let theta = rng.random_range(0.0..TAU);
        let (sin, cos) = theta.sin_cos();
        Particle {
            position: [r * cos, r * sin, 0.0],
            scale: self.scale,
            velocity: [-r * sin, r * cos, 0.0],
            mass: 1.0,
        }
    }

    /// Overwrite every particle in `store` and derive matching transforms. The same seed
    /// always produces the same population, regardless of thread count.
    pub fn fill(&self, store: &mut ParticleStore) {
        store
            .particles_mut()
            .par_chunks_mut(CHUNK)
            .enumerate()
            .for_each(|(chunk_idx, chunk)| {
                let mut rng = StdRng::seed_from_u64(self.seed ^ chunk_idx as u64);
                for particle in chunk {
                    *particle = self.particle(&mut rng);
                }
            });
        store.derive_transforms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::Transform;

    #[test]
    fn particles_stay_inside_the_disc() {
        let mut store = ParticleStore::new(10_000);
        let disc = Disc {
            radius: 2.0,
            ..Default::default()
        };
        disc.fill(&mut store);
        for p in store.particles() {
            let [x, y, z] = p.position;
            assert!((x * x + y * y).sqrt() <= 2.0 + 1e-4);
            assert_eq!(z, 0.0);
            assert_eq!(p.scale, disc.scale);
        }
    }

    #[test]
    fn velocity_is_tangential() {
        let mut store = ParticleStore::new(100);
        Disc::default().fill(&mut store);
        for p in store.particles() {
            let dot = p.position[0] * p.velocity[0] + p.position[1] * p.velocity[1];
            assert!(dot.abs() < 1e-5);
        }
    }

    #[test]
    fn same_seed_same_population() {
        let mut a = ParticleStore::new(CHUNK * 3 + 17);
        let mut b = ParticleStore::new(CHUNK * 3 + 17);
        Disc::default().fill(&mut a);
        Disc::default().fill(&mut b);
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn transforms_follow_particles() {
        let mut store = ParticleStore::new(64);
        Disc::default().fill(&mut store);
        for (p, t) in store.particles().iter().zip(store.transforms()) {
            assert_eq!(*t, Transform::placing(p));
        }
    }
}
