//! Simulation lifecycle: allocation, per-frame ticks, shutdown.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{SimulationConfig, SteeringParams};
use crate::device::{ComputeDevice, DeviceStats};
use crate::dispatcher::{Bindings, DispatchState, SimulationDispatcher};
use crate::error::{DispatchError, FlockError, Result};
use crate::force::ForceBuffer;
use crate::kernels::KernelRegistry;
use crate::ownership::{AssignmentSource, OwnerId, OwnershipTable};
use crate::store::{AgentData, AgentStateStore};
use crate::sync::{HostEntity, SyncLayer};
use crate::Vector3;

/// Result of a tick that did not hit a fatal error
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed,
    /// The frame was not simulated; state is as of the previous frame.
    Skipped(DispatchError),
}

impl TickOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TickOutcome::Completed)
    }
}

/// Axis-aligned box given by its center and full size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub center: Vector3,
    pub size: Vector3,
}

impl Bounds {
    pub fn min(&self) -> Vector3 {
        self.center - self.size * 0.5
    }

    pub fn max(&self) -> Vector3 {
        self.center + self.size * 0.5
    }

    pub fn contains(&self, p: Vector3) -> bool {
        let (lo, hi) = (self.min(), self.max());
        p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y && p.z >= lo.z && p.z <= hi.z
    }
}

/// What a renderer needs to draw the flock as instanced meshes
pub struct RenderView<'a> {
    agents: &'a [AgentData],
    pub object_scale: Vector3,
    pub bounds: Bounds,
}

impl<'a> RenderView<'a> {
    pub fn agents(&self) -> &'a [AgentData] {
        self.agents
    }

    pub fn instance_count(&self) -> usize {
        self.agents.len()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vector3> + 'a {
        self.agents.iter().map(|a| a.position)
    }

    /// Agent buffer bytes in device layout.
    pub fn instance_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.agents)
    }
}

/// A flock of fixed size living on a compute device
pub struct Simulation {
    config: SimulationConfig,
    device: ComputeDevice,
    store: AgentStateStore,
    forces: ForceBuffer,
    ownership: OwnershipTable,
    sync: SyncLayer,
    dispatcher: SimulationDispatcher,
    skipped: u64,
    released: bool,
}

impl Simulation {
    /// Allocate and seed a simulation with the reference kernels.
    pub fn initialize(config: SimulationConfig, seed_positions: &[Vector3]) -> Result<Self> {
        Self::initialize_with_kernels(config, seed_positions, KernelRegistry::standard())
    }

    /// Allocate and seed a simulation. Every phase must have a kernel.
    ///
    /// Positions cycle through `seed_positions` when there are fewer seeds
    /// than agents. Directions are drawn inside a sphere of radius
    /// `config.initial_speed`.
    pub fn initialize_with_kernels(
        config: SimulationConfig,
        seed_positions: &[Vector3],
        kernels: KernelRegistry,
    ) -> Result<Self> {
        config.validate()?;
        if seed_positions.is_empty() {
            return Err(FlockError::EmptySeeds);
        }
        let kernels = kernels.resolve()?;
        let device = ComputeDevice::new(config.worker_threads)?;
        let n = config.population_size;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut store = AgentStateStore::new(&device, n);
        for (agent, seed) in store
            .host_mut()
            .iter_mut()
            .zip(seed_positions.iter().cycle())
        {
            let mut position = *seed;
            if let Some(height) = config.ground_height {
                position.y = height;
            }
            let direction = random_in_unit_sphere(&mut rng) * config.initial_speed;
            *agent = AgentData::new(position, direction);
        }
        store.flush(&device)?;

        let forces = ForceBuffer::new(&device, n);
        let mut ownership = OwnershipTable::new(&device, n);
        ownership.flush(&device)?;

        log::info!(
            "Simulation initialized: {} agents, {} seed positions, {} work groups",
            n,
            seed_positions.len(),
            n.div_ceil(crate::device::WORKGROUP_SIZE)
        );

        Ok(Self {
            sync: SyncLayer::new(config.ground_height),
            config,
            device,
            store,
            forces,
            ownership,
            dispatcher: SimulationDispatcher::new(kernels),
            skipped: 0,
            released: false,
        })
    }

    pub fn population(&self) -> usize {
        self.config.population_size
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn steering(&self) -> &SteeringParams {
        &self.config.steering
    }

    /// Live steering parameters, validated again at the next tick.
    pub fn steering_mut(&mut self) -> &mut SteeringParams {
        &mut self.config.steering
    }

    /// Run one full frame: pull, ownership refresh, Force, Integrate, push.
    ///
    /// A dispatch failure is logged and reported as
    /// [`TickOutcome::Skipped`]; entities are not written in that case,
    /// ownership is rolled back and this frame's claims are handed back
    /// through [`AssignmentSource::rejected`]. With ownership disabled,
    /// claims are drained and dropped. Size and index contract violations
    /// are returned as errors.
    pub fn tick<E, S>(
        &mut self,
        delta_time: f32,
        entities: &mut [E],
        assignments: &mut S,
    ) -> Result<TickOutcome>
    where
        E: HostEntity,
        S: AssignmentSource + ?Sized,
    {
        if self.released {
            return Ok(self.skip(DispatchError::DeviceReleased));
        }
        if let Err(err) = SimulationDispatcher::preflight(&self.config.steering, delta_time) {
            return Ok(self.skip(err));
        }

        self.sync
            .pull_from_host(entities, &mut self.store, &self.device)?;

        let checkpoint = self.ownership.checkpoint();
        let claims = assignments.claims(self.store.host());
        if self.config.steering.ownership_enabled {
            match self.ownership.apply_claims(&claims) {
                Ok(0) => {}
                Ok(assigned) => log::debug!("{} agents claimed this frame", assigned),
                Err(err) => {
                    assignments.rejected(&claims);
                    return Err(err);
                }
            }
            self.ownership.refresh_targets(&*assignments);
        } else if !claims.is_empty() {
            log::debug!("Ownership disabled, dropping {} claims", claims.len());
        }
        self.ownership.flush(&self.device)?;

        let bindings = Bindings::new(&mut self.store, &mut self.forces, &self.ownership)?;
        if let Err(err) =
            self.dispatcher
                .run(&self.device, bindings, &self.config.steering, delta_time)
        {
            self.ownership.restore(checkpoint)?;
            self.ownership.flush(&self.device)?;
            if self.config.steering.ownership_enabled {
                assignments.rejected(&claims);
            }
            return Ok(self.skip(err));
        }

        self.sync
            .push_to_host(&mut self.store, &self.device, entities)?;
        Ok(TickOutcome::Completed)
    }

    fn skip(&mut self, err: DispatchError) -> TickOutcome {
        self.skipped += 1;
        log::error!("Skipping simulation frame: {}", err);
        TickOutcome::Skipped(err)
    }

    /// Copy host entity positions into the agent state store.
    pub fn pull_from_host<E: HostEntity>(&mut self, entities: &[E]) -> Result<()> {
        self.sync
            .pull_from_host(entities, &mut self.store, &self.device)
    }

    /// Copy agent positions back into the host entities.
    pub fn push_to_host<E: HostEntity>(&mut self, entities: &mut [E]) -> Result<()> {
        self.sync
            .push_to_host(&mut self.store, &self.device, entities)
    }

    /// Claim `index` for `owner`; the first claim wins.
    pub fn assign(&mut self, index: usize, owner: OwnerId, initial_target: Vector3) -> Result<bool> {
        self.ownership.assign(index, owner, initial_target)
    }

    pub fn release_owner(&mut self, index: usize) -> Result<Option<OwnerId>> {
        self.ownership.release(index)
    }

    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    /// Snapshot of every agent as of the last completed frame.
    pub fn read_agents(&self) -> Result<Vec<AgentData>> {
        self.store.read(&self.device)
    }

    /// Overwrite the whole population.
    pub fn write_agents(&mut self, agents: &[AgentData]) -> Result<()> {
        self.store.write(&self.device, agents)
    }

    pub fn render_view(&self) -> RenderView<'_> {
        RenderView {
            agents: self.store.front().as_slice(),
            object_scale: self.config.object_scale,
            bounds: Bounds {
                center: self.config.steering.wall_center,
                size: self.config.render_distance,
            },
        }
    }

    pub fn dispatch_state(&self) -> DispatchState {
        self.dispatcher.state()
    }

    pub fn completed_ticks(&self) -> u64 {
        self.dispatcher.completed_ticks()
    }

    pub fn skipped_ticks(&self) -> u64 {
        self.skipped
    }

    pub fn device_stats(&self) -> DeviceStats {
        self.device.stats()
    }

    pub fn is_shut_down(&self) -> bool {
        self.released
    }

    /// Release all device buffers. Calling it again does nothing.
    pub fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.store.release(&self.device);
        self.forces.release(&self.device);
        self.ownership.release_buffers(&self.device);
        self.released = true;
        log::info!(
            "Simulation shut down after {} ticks ({} skipped)",
            self.dispatcher.completed_ticks(),
            self.skipped
        );
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn random_in_unit_sphere<R: Rng>(rng: &mut R) -> Vector3 {
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if v.magnitude_squared() <= 1.0 {
            return v;
        }
    }
}
