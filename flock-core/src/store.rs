//! Agent state store: host staging array mirrored into two device buffers.
//!
//! The front buffer holds the state as of the last completed frame. The
//! Integrate phase writes into the back buffer and the two are swapped only
//! once every agent has been written.

use bytemuck::{Pod, Zeroable};

use crate::device::{ComputeDevice, DeviceBuffer};
use crate::error::{FlockError, Result};
use crate::Vector3;

/// Per-agent state as laid out on the device
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct AgentData {
    pub direction: Vector3,
    pub position: Vector3,
}

impl AgentData {
    pub fn new(position: Vector3, direction: Vector3) -> Self {
        Self {
            direction,
            position,
        }
    }
}

pub struct AgentStateStore {
    host: Vec<AgentData>,
    front: DeviceBuffer<AgentData>,
    back: DeviceBuffer<AgentData>,
}

impl AgentStateStore {
    pub fn new(device: &ComputeDevice, len: usize) -> Self {
        Self {
            host: vec![AgentData::default(); len],
            front: device.allocate("agent state (front)", len),
            back: device.allocate("agent state (back)", len),
        }
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Snapshot of the full population as of the last frame boundary.
    pub fn read(&self, device: &ComputeDevice) -> Result<Vec<AgentData>> {
        let mut snapshot = vec![AgentData::default(); self.len()];
        device.download(&self.front, &mut snapshot)?;
        Ok(snapshot)
    }

    /// Replace the full population. The length must equal the population.
    pub fn write(&mut self, device: &ComputeDevice, snapshot: &[AgentData]) -> Result<()> {
        if snapshot.len() != self.len() {
            return Err(FlockError::SizeMismatch {
                what: "agent snapshot",
                expected: self.len(),
                actual: snapshot.len(),
            });
        }
        self.host.copy_from_slice(snapshot);
        self.flush(device)
    }

    /// Host staging array. Changes reach the device on the next `flush`.
    pub fn host(&self) -> &[AgentData] {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut [AgentData] {
        &mut self.host
    }

    /// Upload the staging array into the front buffer.
    pub fn flush(&mut self, device: &ComputeDevice) -> Result<()> {
        device.upload(&mut self.front, &self.host)
    }

    /// Download the front buffer into the staging array.
    pub fn fetch(&mut self, device: &ComputeDevice) -> Result<()> {
        device.download(&self.front, &mut self.host)
    }

    pub fn front(&self) -> &DeviceBuffer<AgentData> {
        &self.front
    }

    /// Front buffer for reading, back buffer for writing.
    pub(crate) fn phase_buffers(&mut self) -> (&[AgentData], &mut [AgentData]) {
        (self.front.as_slice(), self.back.as_mut_slice())
    }

    /// Publish the back buffer as the new front.
    pub(crate) fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    pub fn is_released(&self) -> bool {
        self.front.is_released()
    }

    pub fn release(&mut self, device: &ComputeDevice) {
        device.free(&mut self.front);
        device.free(&mut self.back);
    }
}
