#![cfg_attr(not(feature = "std"), no_std)]

//! Serializable settings and status messages shared by the flock driver
//! and anything that talks to it.

use serde::{Deserialize, Serialize};

/// A 3D point in world coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Calculate distance to another point
    pub fn distance_to(&self, other: &Point3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        libm::sqrtf(dx * dx + dy * dy + dz * dz)
    }

    /// Distance ignoring the vertical axis
    pub fn planar_distance_to(&self, other: &Point3) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        libm::sqrtf(dx * dx + dz * dz)
    }
}

/// Flocking configuration as stored in a settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlockSettings {
    pub population_size: usize,
    pub max_speed: f32,
    pub max_steer_force: f32,
    pub cohesion_radius: f32,
    pub alignment_radius: f32,
    pub separate_radius: f32,
    pub cohesion_weight: f32,
    pub alignment_weight: f32,
    pub separate_weight: f32,
    pub avoid_wall_weight: f32,
    pub wall_center: Point3,
    pub wall_size: Point3,
    pub wall_margin: f32,
    pub owner_weight: f32,
    pub stay_owner_radius: Point3,
    pub ownership_enabled: bool,
    pub boundary_avoidance_enabled: bool,
    /// `None` keeps agents fully 3D.
    pub ground_height: Option<f32>,
    pub initial_speed: f32,
    pub object_scale: Point3,
    pub render_distance: Point3,
}

impl Default for FlockSettings {
    fn default() -> Self {
        Self {
            population_size: 256,
            max_speed: 5.0,
            max_steer_force: 0.5,
            cohesion_radius: 2.0,
            alignment_radius: 2.0,
            separate_radius: 1.0,
            cohesion_weight: 1.0,
            alignment_weight: 1.0,
            separate_weight: 3.0,
            avoid_wall_weight: 10.0,
            wall_center: Point3::new(0.0, 0.0, 0.0),
            wall_size: Point3::new(32.0, 32.0, 32.0),
            wall_margin: 1.0,
            owner_weight: 10.0,
            stay_owner_radius: Point3::new(5.0, 1.0, 5.0),
            ownership_enabled: true,
            boundary_avoidance_enabled: true,
            ground_height: Some(0.8),
            initial_speed: 0.1,
            object_scale: Point3::new(1.0, 1.0, 1.0),
            render_distance: Point3::new(20.0, 2.0, 20.0),
        }
    }
}

/// Periodic status of a running simulation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub tick: u64,
    pub agent_count: usize,
    pub owned_agents: usize,
    pub skipped_frames: u64,
    pub centroid: Point3,
    pub mean_speed: f32,
}
