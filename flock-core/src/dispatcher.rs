//! Two-phase dispatch: Force then Integrate.
//!
//! The Force phase reads the front agent buffer and writes one force per
//! agent. The Integrate phase reads the front buffer, the forces and the
//! ownership records and writes the back buffer, which is published only
//! when the whole phase succeeded.

use crate::config::SteeringParams;
use crate::device::ComputeDevice;
use crate::error::{DispatchError, FlockError, Result};
use crate::force::ForceBuffer;
use crate::kernels::{KernelTable, Phase, SimParams};
use crate::ownership::OwnershipTable;
use crate::store::AgentStateStore;

/// Where the dispatcher is within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Force,
    Integrate,
}

/// The buffers bound to one dispatch, checked to share one population size.
pub struct Bindings<'a> {
    store: &'a mut AgentStateStore,
    forces: &'a mut ForceBuffer,
    owners: &'a OwnershipTable,
}

impl<'a> Bindings<'a> {
    pub fn new(
        store: &'a mut AgentStateStore,
        forces: &'a mut ForceBuffer,
        owners: &'a OwnershipTable,
    ) -> Result<Self> {
        let expected = store.len();
        for (what, actual) in [("force buffer", forces.len()), ("ownership table", owners.len())] {
            if actual != expected {
                return Err(FlockError::SizeMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            store,
            forces,
            owners,
        })
    }
}

pub struct SimulationDispatcher {
    kernels: KernelTable,
    state: DispatchState,
    completed: u64,
    skipped: u64,
}

impl SimulationDispatcher {
    pub fn new(kernels: KernelTable) -> Self {
        Self {
            kernels,
            state: DispatchState::Idle,
            completed: 0,
            skipped: 0,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn completed_ticks(&self) -> u64 {
        self.completed
    }

    pub fn skipped_ticks(&self) -> u64 {
        self.skipped
    }

    /// Run both phases. On error no agent state has changed.
    pub fn run(
        &mut self,
        device: &ComputeDevice,
        bindings: Bindings<'_>,
        steering: &SteeringParams,
        delta_time: f32,
    ) -> std::result::Result<(), DispatchError> {
        let result = self.run_phases(device, bindings, steering, delta_time);
        self.state = DispatchState::Idle;
        match result {
            Ok(()) => self.completed += 1,
            Err(_) => self.skipped += 1,
        }
        result
    }

    /// Reject a frame before any state is touched.
    pub fn preflight(
        steering: &SteeringParams,
        delta_time: f32,
    ) -> std::result::Result<(), DispatchError> {
        if !delta_time.is_finite() || delta_time < 0.0 {
            return Err(DispatchError::InvalidDeltaTime(delta_time));
        }
        steering.validate()?;
        Ok(())
    }

    fn run_phases(
        &mut self,
        device: &ComputeDevice,
        bindings: Bindings<'_>,
        steering: &SteeringParams,
        delta_time: f32,
    ) -> std::result::Result<(), DispatchError> {
        Self::preflight(steering, delta_time)?;
        let Bindings {
            store,
            forces,
            owners,
        } = bindings;
        if store.is_released() {
            return Err(DispatchError::DeviceReleased);
        }

        let params = SimParams::new(steering, store.len(), delta_time);

        self.state = DispatchState::Force;
        {
            let kernel = self.kernels.force();
            let agents = store.front().as_slice();
            device.dispatch("ForceCS", forces.as_mut_slice(), |i, out| {
                let force = kernel.force(i, agents, &params);
                if !force.is_finite() {
                    return Err(DispatchError::NonFinite {
                        phase: Phase::Force,
                        index: i,
                    });
                }
                *out = force;
                Ok(())
            })?;
        }
        device.barrier();

        self.state = DispatchState::Integrate;
        {
            let kernel = self.kernels.integrate();
            let records = owners.device_records();
            let steering_forces = forces.as_slice();
            let (front, back) = store.phase_buffers();
            device.dispatch("IntegrateCS", back, |i, out| {
                let next = kernel.integrate(&front[i], steering_forces[i], &records[i], &params);
                if !next.position.is_finite() || !next.direction.is_finite() {
                    return Err(DispatchError::NonFinite {
                        phase: Phase::Integrate,
                        index: i,
                    });
                }
                *out = next;
                Ok(())
            })?;
        }
        device.barrier();

        store.swap();
        forces.clear();
        Ok(())
    }
}
