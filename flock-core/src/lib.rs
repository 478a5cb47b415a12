//! Flocking simulation core.
//!
//! Agents live in device buffers and advance through a two-phase pipeline
//! every tick: the Force phase computes one steering vector per agent from
//! the state at phase entry, the Integrate phase folds that force (and an
//! optional owner pull) into direction and position. Host entities are
//! synchronised before and after the pipeline.

use bytemuck::{Pod, Zeroable};

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod force;
pub mod kernels;
pub mod ownership;
pub mod simulation;
pub mod store;
pub mod sync;

pub use config::{SimulationConfig, SteeringParams};
pub use device::{ComputeDevice, DeviceBuffer, DeviceStats, WORKGROUP_SIZE};
pub use dispatcher::{DispatchState, SimulationDispatcher};
pub use error::{DispatchError, FlockError};
pub use force::ForceBuffer;
pub use kernels::{
    EulerIntegrate, FlockingForce, ForceKernel, IntegrateKernel, KernelRegistry, KernelTable,
    Phase, SimParams,
};
pub use ownership::{
    ActorLookup, ActorTable, AssignmentSource, Claim, NoAssignments, OwnerId, OwnerRecord,
    OwnerTally, OwnershipCheckpoint, OwnershipTable,
};
pub use simulation::{Bounds, RenderView, Simulation, TickOutcome};
pub use store::{AgentData, AgentStateStore};
pub use sync::{HostEntity, SyncLayer};

/// A 3D vector used for position, direction and force
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    pub fn dot(&self, other: &Vector3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn magnitude_squared(&self) -> f32 {
        self.dot(self)
    }

    pub fn magnitude(&self) -> f32 {
        self.magnitude_squared().sqrt()
    }

    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        if mag > 0.0 {
            *self / mag
        } else {
            Self::zero()
        }
    }

    /// Clamp the magnitude to `max`, keeping the heading.
    pub fn limit(&self, max: f32) -> Self {
        let mag_sq = self.magnitude_squared();
        if mag_sq > max * max {
            self.normalize() * max
        } else {
            *self
        }
    }

    pub fn distance(&self, other: &Vector3) -> f32 {
        (*self - *other).magnitude()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl core::ops::Add for Vector3 {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl core::ops::Sub for Vector3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl core::ops::Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl core::ops::Mul<f32> for Vector3 {
    type Output = Self;

    fn mul(self, scalar: f32) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }
}

impl core::ops::Div<f32> for Vector3 {
    type Output = Self;

    fn div(self, scalar: f32) -> Self {
        Self {
            x: self.x / scalar,
            y: self.y / scalar,
            z: self.z / scalar,
        }
    }
}

impl core::ops::AddAssign for Vector3 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl core::ops::SubAssign for Vector3 {
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
        self.z -= other.z;
    }
}
