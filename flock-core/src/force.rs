//! Per-agent steering force scratch buffer.

use crate::device::{ComputeDevice, DeviceBuffer};
use crate::error::Result;
use crate::Vector3;

/// One steering vector per agent, written by the Force phase and consumed
/// by the Integrate phase of the same tick.
pub struct ForceBuffer {
    buffer: DeviceBuffer<Vector3>,
}

impl ForceBuffer {
    pub fn new(device: &ComputeDevice, len: usize) -> Self {
        Self {
            buffer: device.allocate("steering force", len),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[Vector3] {
        self.buffer.as_slice()
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Vector3] {
        self.buffer.as_mut_slice()
    }

    /// Zero every entry once the Integrate phase has consumed them.
    pub fn clear(&mut self) {
        self.buffer.as_mut_slice().fill(Vector3::zero());
    }

    /// Copy the current forces to the host.
    pub fn read(&self, device: &ComputeDevice) -> Result<Vec<Vector3>> {
        let mut out = vec![Vector3::zero(); self.len()];
        device.download(&self.buffer, &mut out)?;
        Ok(out)
    }

    pub fn release(&mut self, device: &ComputeDevice) {
        device.free(&mut self.buffer);
    }
}
