//! Host↔device synchronisation of agent positions.

use crate::device::ComputeDevice;
use crate::error::{FlockError, Result};
use crate::store::AgentStateStore;
use crate::Vector3;

/// A host-side object holding the position of one agent.
///
/// The core never creates or destroys these; it only reads the position
/// before a tick and writes it after.
pub trait HostEntity {
    fn position(&self) -> Vector3;
    fn set_position(&mut self, position: Vector3);
}

impl HostEntity for Vector3 {
    fn position(&self) -> Vector3 {
        *self
    }

    fn set_position(&mut self, position: Vector3) {
        *self = position;
    }
}

/// Copies positions between host entities and the agent state store
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncLayer {
    ground_height: Option<f32>,
}

impl SyncLayer {
    /// With a ground height set, agents are pinned to that height on the
    /// device and only their planar coordinates are written back.
    pub fn new(ground_height: Option<f32>) -> Self {
        Self { ground_height }
    }

    pub fn ground_height(&self) -> Option<f32> {
        self.ground_height
    }

    fn check_len(store: &AgentStateStore, actual: usize) -> Result<()> {
        if store.len() != actual {
            return Err(FlockError::SizeMismatch {
                what: "host entities",
                expected: store.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Copy every entity position into the store and upload it.
    pub fn pull_from_host<E: HostEntity>(
        &self,
        entities: &[E],
        store: &mut AgentStateStore,
        device: &ComputeDevice,
    ) -> Result<()> {
        Self::check_len(store, entities.len())?;
        for (agent, entity) in store.host_mut().iter_mut().zip(entities) {
            let mut position = entity.position();
            if let Some(height) = self.ground_height {
                position.y = height;
            }
            agent.position = position;
        }
        store.flush(device)
    }

    /// Download the store and copy every agent position back to its entity.
    pub fn push_to_host<E: HostEntity>(
        &self,
        store: &mut AgentStateStore,
        device: &ComputeDevice,
        entities: &mut [E],
    ) -> Result<()> {
        Self::check_len(store, entities.len())?;
        store.fetch(device)?;
        for (agent, entity) in store.host().iter().zip(entities.iter_mut()) {
            let mut position = agent.position;
            if self.ground_height.is_some() {
                position.y = entity.position().y;
            }
            entity.set_position(position);
        }
        Ok(())
    }
}
