use anyhow::{bail, ensure};
use wgpu::Limits;

use crate::{
    constants::{DEFAULT_POPULATION, DEFAULT_TIME_STEP, DEFAULT_WORK_GROUPS, WORKGROUP_SIZE},
    kernel::{KernelSource, WorkPartition},
};

/// Everything needed to bring up a particle system, besides the initial population.
#[derive(Debug, Clone)]
pub struct SimParameters {
    pub population: usize,
    /// Work groups per dispatch. A tuning knob; any value in range covers the population.
    pub work_groups: u32,
    /// Seconds of simulated time per dispatch.
    pub time_step: f32,
    pub kernel: KernelSource,
}

impl Default for SimParameters {
    fn default() -> Self {
        Self {
            population: DEFAULT_POPULATION,
            work_groups: DEFAULT_WORK_GROUPS,
            time_step: DEFAULT_TIME_STEP,
            kernel: KernelSource::ballistic(),
        }
    }
}

impl SimParameters {
    pub fn with_population(mut self, population: usize) -> Self {
        self.population = population;
        self
    }

    pub fn with_work_groups(mut self, work_groups: u32) -> Self {
        self.work_groups = work_groups;
        self
    }

    pub fn with_time_step(mut self, time_step: f32) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelSource) -> Self {
        self.kernel = kernel;
        self
    }

    /// Check the parameters against the device and work out how the population is split
    /// between invocations.
    pub fn validate(&self, limits: &Limits) -> anyhow::Result<WorkPartition> {
        ensure!(self.population > 0, "population must hold at least one particle");
        ensure!(
            u32::try_from(self.population).is_ok(),
            "population of {} does not fit a 32 bit particle index",
            self.population
        );
        ensure!(
            self.time_step.is_finite() && self.time_step >= 0.0,
            "time step must be a finite, non-negative number of seconds, got {}",
            self.time_step
        );
        if self.work_groups == 0 {
            bail!("a dispatch needs at least one work group");
        }
        if self.work_groups > limits.max_compute_workgroups_per_dimension {
            bail!(
                "{} work groups exceeds the device limit of {}",
                self.work_groups,
                limits.max_compute_workgroups_per_dimension
            );
        }
        if WORKGROUP_SIZE > limits.max_compute_workgroup_size_x
            || WORKGROUP_SIZE > limits.max_compute_invocations_per_workgroup
        {
            bail!(
                "device cannot run work groups of {} invocations",
                WORKGROUP_SIZE
            );
        }
        Ok(WorkPartition::new(self.work_groups, self.population as u32))
    }
}
