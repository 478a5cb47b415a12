use std::path::Path;

use anyhow::{Context, Result};
use flock_core::{SimulationConfig, SteeringParams, Vector3};
use flock_shared::{FlockSettings, Point3};

pub fn to_vector(p: Point3) -> Vector3 {
    Vector3::new(p.x, p.y, p.z)
}

pub fn to_point(v: Vector3) -> Point3 {
    Point3::new(v.x, v.y, v.z)
}

/// Read settings from a JSON file. Missing fields take their defaults.
pub fn load_settings(path: &Path) -> Result<FlockSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let settings: FlockSettings = serde_json::from_str(&text)
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    log::debug!("Loaded settings from {}: {:?}", path.display(), settings);
    Ok(settings)
}

pub fn simulation_config(settings: &FlockSettings, seed: Option<u64>) -> SimulationConfig {
    SimulationConfig {
        population_size: settings.population_size,
        steering: SteeringParams {
            max_speed: settings.max_speed,
            max_steer_force: settings.max_steer_force,
            cohesion_radius: settings.cohesion_radius,
            alignment_radius: settings.alignment_radius,
            separate_radius: settings.separate_radius,
            cohesion_weight: settings.cohesion_weight,
            alignment_weight: settings.alignment_weight,
            separate_weight: settings.separate_weight,
            avoid_wall_weight: settings.avoid_wall_weight,
            wall_center: to_vector(settings.wall_center),
            wall_size: to_vector(settings.wall_size),
            wall_margin: settings.wall_margin,
            owner_weight: settings.owner_weight,
            stay_owner_radius: to_vector(settings.stay_owner_radius),
            ownership_enabled: settings.ownership_enabled,
            boundary_avoidance_enabled: settings.boundary_avoidance_enabled,
        },
        ground_height: settings.ground_height,
        initial_speed: settings.initial_speed,
        seed,
        worker_threads: None,
        object_scale: to_vector(settings.object_scale),
        render_distance: to_vector(settings.render_distance),
    }
}
