//! Simulation configuration.
//!
//! [`SimulationConfig`] is fixed at initialisation. Its [`SteeringParams`]
//! may be adjusted between ticks through [`crate::Simulation::steering_mut`];
//! they are re-validated before every dispatch.

use crate::error::{DispatchError, FlockError};
use crate::Vector3;

/// A parameter that failed validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidParam {
    pub name: &'static str,
    pub value: f32,
}

impl From<InvalidParam> for FlockError {
    fn from(p: InvalidParam) -> Self {
        FlockError::InvalidParameter {
            name: p.name,
            value: p.value,
        }
    }
}

impl From<InvalidParam> for DispatchError {
    fn from(p: InvalidParam) -> Self {
        DispatchError::InvalidParameter {
            name: p.name,
            value: p.value,
        }
    }
}

/// Steering parameters consumed by the compute kernels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringParams {
    pub max_speed: f32,
    pub max_steer_force: f32,
    pub cohesion_radius: f32,
    pub alignment_radius: f32,
    pub separate_radius: f32,
    pub cohesion_weight: f32,
    pub alignment_weight: f32,
    pub separate_weight: f32,
    pub avoid_wall_weight: f32,
    /// Center of the bounding volume.
    pub wall_center: Vector3,
    /// Full extents of the bounding volume.
    pub wall_size: Vector3,
    /// Distance inside the walls at which avoidance already kicks in.
    pub wall_margin: f32,
    pub owner_weight: f32,
    /// Half extents of the box around the owner's target inside which no
    /// pull is applied.
    pub stay_owner_radius: Vector3,
    pub ownership_enabled: bool,
    pub boundary_avoidance_enabled: bool,
}

impl Default for SteeringParams {
    fn default() -> Self {
        Self {
            max_speed: 5.0,
            max_steer_force: 0.5,
            cohesion_radius: 2.0,
            alignment_radius: 2.0,
            separate_radius: 1.0,
            cohesion_weight: 1.0,
            alignment_weight: 1.0,
            separate_weight: 3.0,
            avoid_wall_weight: 10.0,
            wall_center: Vector3::zero(),
            wall_size: Vector3::new(32.0, 32.0, 32.0),
            wall_margin: 1.0,
            owner_weight: 10.0,
            stay_owner_radius: Vector3::new(5.0, 1.0, 5.0),
            ownership_enabled: true,
            boundary_avoidance_enabled: true,
        }
    }
}

impl SteeringParams {
    /// Parameters with every flocking weight zeroed, useful to isolate the
    /// boundary and ownership terms.
    pub fn without_flocking(self) -> Self {
        Self {
            cohesion_weight: 0.0,
            alignment_weight: 0.0,
            separate_weight: 0.0,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), InvalidParam> {
        non_negative("max_speed", self.max_speed)?;
        non_negative("max_steer_force", self.max_steer_force)?;
        non_negative("cohesion_radius", self.cohesion_radius)?;
        non_negative("alignment_radius", self.alignment_radius)?;
        non_negative("separate_radius", self.separate_radius)?;
        non_negative("wall_margin", self.wall_margin)?;
        finite("cohesion_weight", self.cohesion_weight)?;
        finite("alignment_weight", self.alignment_weight)?;
        finite("separate_weight", self.separate_weight)?;
        finite("avoid_wall_weight", self.avoid_wall_weight)?;
        finite("owner_weight", self.owner_weight)?;
        for (name, v) in [
            ("wall_center", self.wall_center),
            ("wall_size", self.wall_size),
            ("stay_owner_radius", self.stay_owner_radius),
        ] {
            for c in [v.x, v.y, v.z] {
                finite(name, c)?;
            }
        }
        for c in [self.wall_size.x, self.wall_size.y, self.wall_size.z] {
            non_negative("wall_size", c)?;
        }
        Ok(())
    }
}

fn finite(name: &'static str, value: f32) -> Result<(), InvalidParam> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(InvalidParam { name, value })
    }
}

fn non_negative(name: &'static str, value: f32) -> Result<(), InvalidParam> {
    finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(InvalidParam { name, value })
    }
}

/// Configuration for the flocking simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub population_size: usize,
    pub steering: SteeringParams,
    /// Height the agents are pinned to while on the device. `None` keeps the
    /// full 3D position.
    pub ground_height: Option<f32>,
    /// Radius of the sphere initial directions are drawn from.
    pub initial_speed: f32,
    /// Seed for initial directions; `None` draws from entropy.
    pub seed: Option<u64>,
    /// Device worker threads; `None` lets rayon decide.
    pub worker_threads: Option<usize>,
    /// Per-instance scale handed to the renderer.
    pub object_scale: Vector3,
    /// Extents of the render bounds handed to the renderer.
    pub render_distance: Vector3,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            population_size: 256,
            steering: SteeringParams::default(),
            ground_height: Some(0.8),
            initial_speed: 0.1,
            seed: None,
            worker_threads: None,
            object_scale: Vector3::new(1.0, 1.0, 1.0),
            render_distance: Vector3::new(20.0, 2.0, 20.0),
        }
    }
}

impl SimulationConfig {
    pub fn with_population(population_size: usize) -> Self {
        Self {
            population_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), FlockError> {
        if self.population_size == 0 {
            return Err(FlockError::InvalidPopulation(self.population_size));
        }
        if self.worker_threads == Some(0) {
            return Err(FlockError::InvalidParameter {
                name: "worker_threads",
                value: 0.0,
            });
        }
        non_negative("initial_speed", self.initial_speed)?;
        if let Some(h) = self.ground_height {
            finite("ground_height", h)?;
        }
        self.steering.validate()?;
        Ok(())
    }
}
