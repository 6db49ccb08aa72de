use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::time::{Duration, Instant};

use vanet_sim::{
    config::{IntersectionType, SimulationConfig},
    simulation::{PerformanceTracker, World},
    CoordinatorPeer,
};

#[derive(Parser)]
#[command(name = "vanet-sim")]
#[command(about = "Decentralized intersection crossing for simulated autonomous vehicles")]
struct Args {
    /// Simulation configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Override how intersections are crossed
    #[arg(short, long, value_enum)]
    policy: Option<Policy>,

    /// Random seed for reproducible simulations
    #[arg(short, long)]
    seed: Option<u64>,

    /// Simulated time to run, in seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Enable verbose logging for detailed simulation progress
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Tile reservations negotiated over the coordination network
    Reservation,
    /// Fixed-phase traffic lights
    TrafficLight,
}

impl From<Policy> for IntersectionType {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Reservation => IntersectionType::Reservation,
            Policy::TrafficLight => IntersectionType::TrafficLight,
        }
    }
}

fn load_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load_from_file(path).with_context(|| format!("loading {}", path))?,
        None => SimulationConfig::default(),
    };

    if let Some(policy) = args.policy {
        config.network.intersection_type = policy.into();
    }
    if args.seed.is_some() {
        config.simulation.seed = args.seed;
    }
    if let Some(secs) = args.duration {
        config.simulation.duration_ms = secs * 1000;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();
    info!("Starting VANET intersection simulator");

    let config = load_config(&args)?;
    info!(
        "Loaded configuration: {}x{} intersections, {:?}, {:.0} vehicles/h",
        config.network.width, config.network.height, config.network.intersection_type, config.vehicles.vehicles_per_hour
    );

    let tick_ms = config.simulation.tick_ms;
    let duration_ms = config.simulation.duration_ms;
    let mut world = World::new(config, CoordinatorPeer::new())?;
    let mut performance_tracker = PerformanceTracker::new(100);

    info!("Running simulation for {} simulated seconds...", duration_ms / 1000);
    let start_time = Instant::now();
    let mut now_ms = 0;
    let mut step_count: u64 = 0;

    while now_ms < duration_ms {
        now_ms += tick_ms;

        performance_tracker.start_frame();
        world.step(now_ms, tick_ms);
        performance_tracker.end_frame();
        step_count += 1;

        // status once per simulated second
        if now_ms % 1000 < tick_ms {
            info!(
                "t={:>4}s: {} vehicles active, {} spawned, {} finished, {} recent collisions, {:.0} steps/s, {:.3}ms/step",
                now_ms / 1000,
                world.vehicle_count(),
                world.total_spawned(),
                world.total_finished(),
                world.physics().collisions().len(),
                performance_tracker.steps_per_second(),
                performance_tracker.average_frame_time().as_secs_f64() * 1000.0
            );
        }
    }

    let total_time = start_time.elapsed();
    info!("Simulation completed!");
    info!("Wall time: {:.2}s for {} steps", total_time.as_secs_f64(), step_count);
    info!(
        "Speedup over real time: {:.1}x",
        Duration::from_millis(duration_ms).as_secs_f64() / total_time.as_secs_f64().max(1e-9)
    );
    info!(
        "Final vehicle count: {} active, {} total spawned, {} finished",
        world.vehicle_count(),
        world.total_spawned(),
        world.total_finished()
    );

    Ok(())
}
