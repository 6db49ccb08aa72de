use super::physics::{PhysicsEngine, VehicleBody};
use crate::config::VehiclesConfig;
use crate::geometry::Vec2;
use crate::network::{LaneId, RoadNetwork, Turn};
use crate::vehicle::VehicleId;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct ArrivalPolicy {
    vehicles_per_hour: f64,
}

impl ArrivalPolicy {
    pub fn new(vehicles_per_hour: f64) -> Self {
        Self { vehicles_per_hour }
    }

    pub fn due(&self, now_ms: u64, total_spawned: u64) -> u64 {
        let expected = (now_ms as f64 / 1000.0 * self.vehicles_per_hour / 3600.0).floor() as u64;
        expected.saturating_sub(total_spawned)
    }
}

pub fn draw_turn<R: Rng + ?Sized>(rng: &mut R, config: &VehiclesConfig) -> Turn {
    let r: f64 = rng.gen();
    if r < config.left_turn_rate {
        Turn::Left
    } else if r < config.left_turn_rate + config.right_turn_rate {
        Turn::Right
    } else {
        Turn::Straight
    }
}

/// Spawn slot for a new vehicle: a random entry lane offering the drawn
/// turn, behind whatever is already queued on it.
pub fn free_position<'a, I, R>(network: &RoadNetwork, bodies: I, rng: &mut R, config: &VehiclesConfig) -> (LaneId, Vec2, Turn)
where
    I: IntoIterator<Item = (VehicleId, &'a VehicleBody)>,
    R: Rng + ?Sized,
{
    let mut turn = draw_turn(rng, config);
    let mut lanes = network.entry_lanes_with_turn(turn);
    if lanes.is_empty() {
        turn = Turn::Straight;
        lanes = network.entry_lanes_with_turn(turn);
    }
    if lanes.is_empty() {
        lanes = network.entry_lanes().map(|l| l.id).collect();
    }

    let s = network.tile_size();
    let Some(&lane_id) = lanes.choose(rng) else {
        // a network always has entry lanes; park at the origin otherwise
        log::warn!("Road network has no entry lanes");
        return (LaneId(0), Vec2::zeros(), turn);
    };
    let lane = network.lane(lane_id);
    let dir = lane.direction_vector();

    // probe from half a tile past the stop line back along the lane
    let probe = lane.end_pos + dir * (0.5 * s);
    let back = -dir;
    let queued = PhysicsEngine::line_hits(bodies, &probe, &back)
        .into_iter()
        .map(|hit| hit.distance)
        .filter(|d| *d >= 0.0)
        .fold(0.0, f64::max);

    let position = probe + back * (queued + (0.5 + network.lane_length() as f64) * s);
    log::debug!("Free position on lane {:?} at ({:.1}, {:.1})", lane_id, position.x, position.y);

    (lane_id, position, turn)
}
