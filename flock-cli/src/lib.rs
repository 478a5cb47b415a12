//! Headless driver for the flock simulation: settings loading and a
//! scripted scene standing in for the game world.

pub mod scene;
pub mod settings;

pub use scene::{ProximityClaims, Scene, ScriptedPlayer, Spawner};
pub use settings::{load_settings, simulation_config};
