use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use flock_cli::settings::to_vector;
use flock_cli::{load_settings, simulation_config, ProximityClaims, Scene, Spawner};
use flock_core::TickOutcome;
use flock_shared::FlockSettings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless flocking simulation", long_about = None)]
struct Args {
    /// JSON settings file; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of agents
    #[arg(short = 'n', long)]
    population: Option<usize>,

    /// Frames to simulate
    #[arg(short, long, default_value_t = 600)]
    ticks: u64,

    /// Seconds per frame
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Seed for initial directions
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of scripted players claiming agents
    #[arg(short, long, default_value_t = 2)]
    players: usize,

    /// Print a status report every N frames (0 prints only the final one)
    #[arg(short, long, default_value_t = 60)]
    report_every: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.debug {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let mut settings = match &args.config {
        Some(path) => load_settings(path)?,
        None => FlockSettings::default(),
    };
    if let Some(population) = args.population {
        settings.population_size = population;
    }

    log::info!("Flock simulation starting...");
    log::info!("Agents: {}", settings.population_size);
    log::info!("Players: {}", args.players);

    let center = to_vector(settings.wall_center);
    let spawner = Spawner::ring(center, settings.wall_size.x * 0.25, 8);
    let players =
        ProximityClaims::circling(args.players, center, settings.wall_size.x * 0.3, 1.0)
            .context("Failed to create players")?;
    let mut scene = Scene::new(simulation_config(&settings, args.seed), &spawner, players)
        .context("Failed to initialize simulation")?;

    for _ in 0..args.ticks {
        if let TickOutcome::Skipped(err) = scene.step(args.dt).context("Simulation error")? {
            log::warn!("Frame {} skipped: {}", scene.tick_count(), err);
        }
        if args.report_every > 0 && scene.tick_count() % args.report_every == 0 {
            print_report(&scene)?;
        }
    }
    if args.ticks == 0 || args.report_every == 0 || scene.tick_count() % args.report_every != 0 {
        print_report(&scene)?;
    }

    scene.shutdown();
    Ok(())
}

fn print_report(scene: &Scene) -> Result<()> {
    let report = scene.report().context("Failed to read agents")?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
