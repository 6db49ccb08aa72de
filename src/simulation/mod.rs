use crate::channel::ChannelProvider;
use crate::config::{SimulationConfig, Validate};
use crate::error::Result;
use crate::geometry::Vec2;
use crate::network::RoadNetwork;
use crate::vehicle::{CrossingPolicy, Platoons, StepContext, VehicleController, VehicleId, VehicleState, PARKED_COORD};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};

pub mod physics;
pub mod traffic;

pub use physics::*;
pub use traffic::*;

pub const SENSOR_RANGE_TILES: f64 = 500.0;

/// External source and sink of vehicle positions, e.g. a radio simulator
/// that moves the motes the vehicles are bound to.
pub trait PositionProvider {
    /// Position to adopt before physics runs, if the provider has one.
    fn read(&mut self, vehicle: VehicleId) -> Option<Vec2>;

    fn write(&mut self, vehicle: VehicleId, position: Vec2);

    /// `from` handed its controller link to `to`. Providers that bind motes
    /// to vehicles swap the two bindings.
    fn swap(&mut self, _from: VehicleId, _to: VehicleId) {}
}

#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u32,
    freed: BTreeSet<u16>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            next: 1,
            freed: BTreeSet::new(),
        }
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> Option<VehicleId> {
        if let Some(id) = self.freed.pop_first() {
            return Some(VehicleId(id));
        }
        if self.next > u32::from(u16::MAX) {
            return None;
        }
        let id = self.next as u16;
        self.next += 1;
        Some(VehicleId(id))
    }

    pub fn free(&mut self, id: VehicleId) {
        if id.0 != 0 && u32::from(id.0) < self.next {
            self.freed.insert(id.0);
        }
    }

    pub fn in_use(&self) -> usize {
        (self.next - 1) as usize - self.freed.len()
    }
}

pub struct World<P: ChannelProvider> {
    config: SimulationConfig,
    network: RoadNetwork,
    physics: PhysicsEngine,
    vehicles: BTreeMap<VehicleId, VehicleController>,
    platoons: Platoons,
    ids: IdGenerator,
    arrivals: ArrivalPolicy,
    policy: CrossingPolicy,
    provider: P,
    positions: Option<Box<dyn PositionProvider>>,
    rng: StdRng,
    now_ms: u64,
    total_spawned: u64,
    total_finished: u64,
}

impl<P: ChannelProvider> World<P> {
    pub fn new(config: SimulationConfig, provider: P) -> Result<Self> {
        config.validate()?;

        let rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let network = RoadNetwork::new(&config.network);
        log::info!(
            "World with {} intersections, {} lanes, {:?} crossings",
            network.intersections().count(),
            network.lanes().count(),
            config.network.intersection_type
        );

        Ok(Self {
            network,
            physics: PhysicsEngine::new(),
            vehicles: BTreeMap::new(),
            platoons: Platoons::new(config.vehicles.platoon_cap()),
            ids: IdGenerator::new(),
            arrivals: ArrivalPolicy::new(config.vehicles.vehicles_per_hour),
            policy: config.network.intersection_type.into(),
            provider,
            positions: None,
            rng,
            now_ms: 0,
            total_spawned: 0,
            total_finished: 0,
            config,
        })
    }

    pub fn set_position_provider(&mut self, provider: Box<dyn PositionProvider>) {
        self.positions = Some(provider);
    }

    pub fn step(&mut self, now_ms: u64, delta_ms: u64) {
        self.now_ms = now_ms;
        let dt = delta_ms as f64 / 1000.0;

        self.spawn_arrivals();
        self.read_positions();

        self.physics
            .step(self.vehicles.iter_mut().map(|(id, v)| (*id, v.body_mut())), dt, now_ms);
        self.update_sensors();

        // each vehicle is taken out while it steps so it can reach all others
        let ids: Vec<VehicleId> = self.vehicles.keys().copied().collect();
        let mut handovers = Vec::new();
        for id in ids {
            let Some(mut vehicle) = self.vehicles.remove(&id) else {
                continue;
            };
            let mut ctx = StepContext {
                now_ms,
                dt,
                network: &mut self.network,
                others: &mut self.vehicles,
                platoons: &mut self.platoons,
                rng: &mut self.rng,
                config: &self.config.vehicles,
            };
            vehicle.step(&mut ctx);
            if let Some(to) = vehicle.take_handover() {
                handovers.push((id, to));
            }
            self.vehicles.insert(id, vehicle);
        }

        if let Some(provider) = self.positions.as_mut() {
            for (from, to) in handovers {
                provider.swap(from, to);
            }
        }
        self.write_positions();

        if self.config.vehicles.log_events {
            for vehicle in self.vehicles.values() {
                vehicle.log_events(now_ms);
            }
        }

        let finished: Vec<VehicleId> = self
            .vehicles
            .values()
            .filter(|v| v.state() == VehicleState::Finished)
            .map(|v| v.id())
            .collect();
        for id in finished {
            self.remove_vehicle(id);
            self.total_finished += 1;
        }

        self.provider.poll(now_ms);
    }

    fn spawn_arrivals(&mut self) {
        let due = self.arrivals.due(self.now_ms, self.total_spawned);
        for _ in 0..due {
            if self.spawn_vehicle(Vec2::repeat(PARKED_COORD)).is_none() {
                break;
            }
        }
    }

    /// Adds a vehicle at `position`. It stays inert until its controller
    /// sends `init`. Returns `None` when all ids are taken.
    pub fn spawn_vehicle(&mut self, position: Vec2) -> Option<VehicleId> {
        let Some(id) = self.ids.next_id() else {
            log::warn!("No vehicle id left, dropping arrival");
            return None;
        };

        let channel = self.provider.open(id);
        let platoon = self.platoons.create(id);
        let vehicle = VehicleController::new(
            id,
            position,
            channel,
            self.policy,
            platoon,
            self.config.vehicles.kinematics.radius,
        );
        self.vehicles.insert(id, vehicle);
        self.total_spawned += 1;

        log::debug!("Spawned vehicle {} at {} ms", id, self.now_ms);
        Some(id)
    }

    pub fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        let Some(vehicle) = self.vehicles.remove(&id) else {
            return false;
        };
        vehicle.detach(&mut self.vehicles, &mut self.platoons);
        self.ids.free(id);
        log::debug!("Removed vehicle {} in state {:?}", id, vehicle.state());
        true
    }

    fn read_positions(&mut self) {
        let Some(provider) = self.positions.as_mut() else {
            return;
        };
        for (id, vehicle) in self.vehicles.iter_mut() {
            if let Some(pos) = provider.read(*id) {
                vehicle.body_mut().center = pos;
            }
        }
    }

    fn write_positions(&mut self) {
        let Some(provider) = self.positions.as_mut() else {
            return;
        };
        for (id, vehicle) in &self.vehicles {
            provider.write(*id, vehicle.body().center);
        }
    }

    fn update_sensors(&mut self) {
        let range = SENSOR_RANGE_TILES * self.network.tile_size();
        let readings: Vec<(VehicleId, Option<LineHit>)> = self
            .vehicles
            .values()
            .map(|v| {
                let body = v.body();
                let reading = if body.registered {
                    let bodies = self.vehicles.values().map(|o| (o.id(), o.body()));
                    PhysicsEngine::nearest_hit(bodies, &body.center, &body.dir, v.id(), range)
                } else {
                    None
                };
                (v.id(), reading)
            })
            .collect();

        for (id, reading) in readings {
            if let Some(v) = self.vehicles.get_mut(&id) {
                v.set_sensor(reading);
            }
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn physics(&self) -> &PhysicsEngine {
        &self.physics
    }

    pub fn platoons(&self) -> &Platoons {
        &self.platoons
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn get_vehicle(&self, id: VehicleId) -> Option<&VehicleController> {
        self.vehicles.get(&id)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleController> {
        self.vehicles.values()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn total_spawned(&self) -> u64 {
        self.total_spawned
    }

    pub fn total_finished(&self) -> u64 {
        self.total_finished
    }
}

#[derive(Debug)]
pub struct PerformanceTracker {
    samples: VecDeque<Duration>,
    max_samples: usize,
    current_frame_start: Option<Instant>,
}

impl PerformanceTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            current_frame_start: None,
        }
    }

    pub fn start_frame(&mut self) {
        self.current_frame_start = Some(Instant::now());
    }

    pub fn end_frame(&mut self) {
        if let Some(start) = self.current_frame_start.take() {
            if self.samples.len() >= self.max_samples {
                self.samples.pop_front();
            }
            self.samples.push_back(start.elapsed());
        }
    }

    pub fn average_frame_time(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }

        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn steps_per_second(&self) -> f64 {
        let avg = self.average_frame_time();
        if avg.is_zero() {
            return 0.0;
        }
        1.0 / avg.as_secs_f64()
    }
}
