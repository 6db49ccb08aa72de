use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vanet_sim::{config::SimulationConfig, simulation::World, CoordinatorPeer};

const TICK_MS: u64 = 20;

fn populated_world(width: usize, vehicles_per_hour: f64, warmup_ms: u64) -> (World<CoordinatorPeer>, u64) {
    let mut config = SimulationConfig::default();
    config.network.width = width;
    config.network.height = width;
    config.vehicles.vehicles_per_hour = vehicles_per_hour;
    config.vehicles.left_turn_rate = 0.2;
    config.vehicles.right_turn_rate = 0.2;
    config.vehicles.max_platoon_size = 4;
    config.simulation.seed = Some(42);

    let mut world = World::new(config, CoordinatorPeer::new()).expect("Failed to build world");

    // Pre-populate with vehicles for realistic benchmarking
    let mut now_ms = 0;
    while now_ms < warmup_ms {
        now_ms += TICK_MS;
        world.step(now_ms, TICK_MS);
    }
    (world, now_ms)
}

fn benchmark_world_step(c: &mut Criterion) {
    let (mut world, mut now_ms) = populated_world(1, 1200.0, 30_000);

    c.bench_function("world_step", |b| {
        b.iter(|| {
            now_ms += TICK_MS;
            world.step(black_box(now_ms), TICK_MS);
        })
    });
}

fn benchmark_network_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("network_scaling");

    for width in [1usize, 2, 3].iter() {
        let (mut world, mut now_ms) = populated_world(*width, 600.0 * (*width * *width) as f64, 20_000);

        group.bench_with_input(format!("{}x{}_intersections", width, width), width, |b, _width| {
            b.iter(|| {
                now_ms += TICK_MS;
                world.step(black_box(now_ms), TICK_MS);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_world_step, benchmark_network_scaling);
criterion_main!(benches);
