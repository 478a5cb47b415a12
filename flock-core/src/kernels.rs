//! Compute kernels for the Force and Integrate phases.

use std::fmt;

use bytemuck::{Pod, Zeroable};

use crate::config::SteeringParams;
use crate::error::{FlockError, Result};
use crate::ownership::OwnerRecord;
use crate::store::AgentData;
use crate::Vector3;

/// One of the two compute passes of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Force,
    Integrate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Force => write!(f, "Force"),
            Phase::Integrate => write!(f, "Integrate"),
        }
    }
}

/// Uniform block bound to every dispatch
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SimParams {
    pub population: u32,
    pub delta_time: f32,
    pub max_speed: f32,
    pub max_steer_force: f32,
    pub cohesion_radius: f32,
    pub alignment_radius: f32,
    pub separate_radius: f32,
    pub cohesion_weight: f32,
    pub alignment_weight: f32,
    pub separate_weight: f32,
    pub avoid_wall_weight: f32,
    pub wall_margin: f32,
    pub owner_weight: f32,
    pub ownership_enabled: u32,
    pub boundary_avoidance_enabled: u32,
    pub wall_center: Vector3,
    pub wall_size: Vector3,
    pub stay_owner_radius: Vector3,
}

impl SimParams {
    pub fn new(steering: &SteeringParams, population: usize, delta_time: f32) -> Self {
        Self {
            population: population as u32,
            delta_time,
            max_speed: steering.max_speed,
            max_steer_force: steering.max_steer_force,
            cohesion_radius: steering.cohesion_radius,
            alignment_radius: steering.alignment_radius,
            separate_radius: steering.separate_radius,
            cohesion_weight: steering.cohesion_weight,
            alignment_weight: steering.alignment_weight,
            separate_weight: steering.separate_weight,
            avoid_wall_weight: steering.avoid_wall_weight,
            wall_margin: steering.wall_margin,
            owner_weight: steering.owner_weight,
            ownership_enabled: steering.ownership_enabled as u32,
            boundary_avoidance_enabled: steering.boundary_avoidance_enabled as u32,
            wall_center: steering.wall_center,
            wall_size: steering.wall_size,
            stay_owner_radius: steering.stay_owner_radius,
        }
    }

    /// Reynolds steering: turn `velocity` toward `heading` at full speed,
    /// limited to the maximum steering force.
    pub fn steer(&self, heading: Vector3, velocity: Vector3) -> Vector3 {
        (heading.normalize() * self.max_speed - velocity).limit(self.max_steer_force)
    }
}

/// Computes the steering force of one agent from the whole population.
pub trait ForceKernel: Send + Sync {
    fn force(&self, index: usize, agents: &[AgentData], params: &SimParams) -> Vector3;
}

/// Advances one agent given its force and ownership record.
pub trait IntegrateKernel: Send + Sync {
    fn integrate(
        &self,
        agent: &AgentData,
        force: Vector3,
        owner: &OwnerRecord,
        params: &SimParams,
    ) -> AgentData;
}

/// Cohesion, alignment and separation over an all-pairs scan, plus
/// boundary avoidance
#[derive(Debug, Clone, Copy, Default)]
pub struct FlockingForce;

impl FlockingForce {
    /// Unit push back toward the interior on every axis where `position` is
    /// outside, or within the margin of, the bounding volume.
    pub fn avoid_wall(position: Vector3, params: &SimParams) -> Vector3 {
        let axis = |p: f32, center: f32, size: f32| {
            let half = size * 0.5 - params.wall_margin;
            let mut push = 0.0;
            if p < center - half {
                push += 1.0;
            }
            if p > center + half {
                push -= 1.0;
            }
            push
        };
        let (c, s) = (params.wall_center, params.wall_size);
        Vector3::new(
            axis(position.x, c.x, s.x),
            axis(position.y, c.y, s.y),
            axis(position.z, c.z, s.z),
        )
    }
}

impl ForceKernel for FlockingForce {
    fn force(&self, index: usize, agents: &[AgentData], params: &SimParams) -> Vector3 {
        let me = &agents[index];

        let mut cohesion_sum = Vector3::zero();
        let mut alignment_sum = Vector3::zero();
        let mut separation_sum = Vector3::zero();
        let (mut cohesion_count, mut alignment_count, mut separation_count) = (0u32, 0u32, 0u32);

        for other in agents {
            let diff = me.position - other.position;
            let distance = diff.magnitude();
            // self, and anything sitting exactly on top of us
            if distance <= 0.0 {
                continue;
            }
            if distance <= params.cohesion_radius {
                cohesion_sum += other.position;
                cohesion_count += 1;
            }
            if distance <= params.alignment_radius {
                alignment_sum += other.direction;
                alignment_count += 1;
            }
            if distance <= params.separate_radius {
                separation_sum += diff.normalize() / distance;
                separation_count += 1;
            }
        }

        let mut force = Vector3::zero();
        if separation_count > 0 {
            let heading = separation_sum / separation_count as f32;
            force += params.steer(heading, me.direction) * params.separate_weight;
        }
        if alignment_count > 0 {
            let heading = alignment_sum / alignment_count as f32;
            force += params.steer(heading, me.direction) * params.alignment_weight;
        }
        if cohesion_count > 0 {
            let centroid = cohesion_sum / cohesion_count as f32;
            force += params.steer(centroid - me.position, me.direction) * params.cohesion_weight;
        }
        if params.boundary_avoidance_enabled != 0 {
            force += Self::avoid_wall(me.position, params) * params.avoid_wall_weight;
        }

        force.limit(params.max_steer_force)
    }
}

/// Explicit Euler integration with an optional pull toward the owner
#[derive(Debug, Clone, Copy, Default)]
pub struct EulerIntegrate;

impl EulerIntegrate {
    /// Unit heading toward the owner's target, or `None` when the agent is
    /// unowned, ownership is off or the agent is inside the stay box.
    pub fn owner_heading(
        position: Vector3,
        owner: &OwnerRecord,
        params: &SimParams,
    ) -> Option<Vector3> {
        if params.ownership_enabled == 0 || !owner.is_owned() {
            return None;
        }
        let offset = owner.target - position;
        let r = params.stay_owner_radius;
        let outside = offset.x.abs() > r.x || offset.y.abs() > r.y || offset.z.abs() > r.z;
        outside.then(|| offset.normalize())
    }

    /// Velocity after the owner term: motion away from the owner is dropped,
    /// then a weighted seek toward it is added.
    pub fn owner_pull(direction: Vector3, heading: Vector3, params: &SimParams) -> Vector3 {
        let away = direction.dot(&heading).min(0.0);
        let direction = direction - heading * away;
        direction + params.steer(heading, direction) * params.owner_weight * params.delta_time
    }
}

impl IntegrateKernel for EulerIntegrate {
    fn integrate(
        &self,
        agent: &AgentData,
        force: Vector3,
        owner: &OwnerRecord,
        params: &SimParams,
    ) -> AgentData {
        let dt = params.delta_time;

        let mut direction = agent.direction + force * dt;
        if let Some(heading) = Self::owner_heading(agent.position, owner, params) {
            direction = Self::owner_pull(direction, heading, params);
        }
        let direction = direction.limit(params.max_speed);
        let position = agent.position + direction * dt;

        AgentData {
            direction,
            position,
        }
    }
}

/// Kernels registered per phase, possibly incomplete
#[derive(Default)]
pub struct KernelRegistry {
    force: Option<Box<dyn ForceKernel>>,
    integrate: Option<Box<dyn IntegrateKernel>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reference flocking kernels.
    pub fn standard() -> Self {
        Self::new()
            .with_force(FlockingForce)
            .with_integrate(EulerIntegrate)
    }

    pub fn with_force(mut self, kernel: impl ForceKernel + 'static) -> Self {
        self.force = Some(Box::new(kernel));
        self
    }

    pub fn with_integrate(mut self, kernel: impl IntegrateKernel + 'static) -> Self {
        self.integrate = Some(Box::new(kernel));
        self
    }

    pub fn contains(&self, phase: Phase) -> bool {
        match phase {
            Phase::Force => self.force.is_some(),
            Phase::Integrate => self.integrate.is_some(),
        }
    }

    /// Turn the registry into a table with a kernel for every phase.
    pub fn resolve(self) -> Result<KernelTable> {
        let force = self.force.ok_or(FlockError::MissingKernel(Phase::Force))?;
        let integrate = self
            .integrate
            .ok_or(FlockError::MissingKernel(Phase::Integrate))?;
        Ok(KernelTable { force, integrate })
    }
}

/// A kernel for every phase, resolved once at initialisation
pub struct KernelTable {
    force: Box<dyn ForceKernel>,
    integrate: Box<dyn IntegrateKernel>,
}

impl KernelTable {
    pub fn force(&self) -> &dyn ForceKernel {
        self.force.as_ref()
    }

    pub fn integrate(&self) -> &dyn IntegrateKernel {
        self.integrate.as_ref()
    }
}
