//! Static road topology: a grid of intersections whose lanes are stitched
//! into one directed graph.

use crate::config::NetworkConfig;
use crate::geometry::{self, Vec2};

pub mod intersection;
pub mod lane;
pub mod tiles;

pub use intersection::*;
pub use lane::*;
pub use tiles::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntersectionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LaneId(pub usize);

#[derive(Debug, Clone)]
pub struct RoadNetwork {
    width: usize,
    height: usize,
    tile_size: f64,
    lane_length: usize,
    straight_steps: usize,
    intersections: Vec<Intersection>,
    lanes: Vec<Lane>,
}

impl RoadNetwork {
    /// Lays intersections out left to right, top to bottom, connecting each
    /// one to its left and top neighbour as it is created.
    pub fn new(config: &NetworkConfig) -> Self {
        let mut network = Self {
            width: config.width,
            height: config.height,
            tile_size: config.tile_size,
            lane_length: config.lane_length,
            straight_steps: config.tiles_x.max(config.tiles_y),
            intersections: Vec::with_capacity(config.width * config.height),
            lanes: Vec::new(),
        };

        let spacing = config.intersection_spacing();
        for y in 0..config.height {
            for x in 0..config.width {
                let id = IntersectionId(y * config.width + x);
                let offset = Vec2::new(x as f64 * spacing, y as f64 * spacing);
                let intersection = Intersection::new(id, offset, config, &mut network.lanes);
                network.intersections.push(intersection);

                if x > 0 {
                    network.connect_lanes(id, IntersectionId(id.0 - 1));
                }
                if y > 0 {
                    network.connect_lanes(id, IntersectionId(id.0 - config.width));
                }
            }
        }

        log::debug!(
            "Built {}x{} road network with {} entry lanes",
            network.width,
            network.height,
            network.entry_lanes().count()
        );

        network
    }

    /// Joins every dangling outgoing lane of one intersection with the
    /// dangling incoming lane of the other that continues it. The outgoing
    /// lane survives and takes over the incoming lane's end.
    fn connect_lanes(&mut self, a: IntersectionId, b: IntersectionId) {
        let mut pairs = self.matching_pairs(a, b);
        pairs.extend(self.matching_pairs(b, a));

        for (keep, replaced) in pairs {
            let (end_pos, end) = {
                let r = &mut self.lanes[replaced.0];
                assert!(!r.replaced, "lane {:?} was already replaced during stitching", replaced);
                r.replaced = true;
                (r.end_pos, r.end)
            };
            let Some(end) = end else {
                continue;
            };

            let lane = &mut self.lanes[keep.0];
            lane.end_pos = end_pos;
            lane.end = Some(end);

            self.intersections[end.intersection.0].replace_lane(end.local_id, keep);
        }
    }

    fn matching_pairs(&self, from: IntersectionId, to: IntersectionId) -> Vec<(LaneId, LaneId)> {
        let tolerance = 0.01 * self.tile_size;
        let mut pairs = Vec::new();

        for out_id in self.intersections[from.0].end_lanes() {
            let out = &self.lanes[out_id.0];
            if out.end.is_some() {
                continue;
            }
            let join_pos = out.end_pos - out.direction_vector() * self.tile_size;

            for in_id in self.intersections[to.0].start_lanes() {
                let incoming = &self.lanes[in_id.0];
                if incoming.start.is_none() && geometry::distance(&join_pos, &incoming.start_pos) < tolerance {
                    pairs.push((out_id, in_id));
                }
            }
        }

        pairs
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    pub fn lane_length(&self) -> usize {
        self.lane_length
    }

    pub fn intersection(&self, id: IntersectionId) -> &Intersection {
        &self.intersections[id.0]
    }

    pub fn intersection_mut(&mut self, id: IntersectionId) -> &mut Intersection {
        &mut self.intersections[id.0]
    }

    pub fn intersections(&self) -> impl Iterator<Item = &Intersection> {
        self.intersections.iter()
    }

    pub fn lane(&self, id: LaneId) -> &Lane {
        &self.lanes[id.0]
    }

    /// All lanes still part of the graph.
    pub fn lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.iter().filter(|l| !l.replaced)
    }

    pub fn entry_lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes().filter(|l| l.is_entry())
    }

    /// Outgoing lanes reachable from `arrival` at the intersection it feeds.
    pub fn possible_lanes(&self, arrival: LaneId) -> Vec<LaneId> {
        let Some(end) = self.lanes[arrival.0].end else {
            return Vec::new();
        };
        let intersection = &self.intersections[end.intersection.0];
        intersection
            .turn_options(end.local_id)
            .map(|options| options.all().filter_map(|id| intersection.end_lane(id)).collect())
            .unwrap_or_default()
    }

    /// Reachable lanes from `arrival` that require `turn`.
    pub fn lanes_with_turn(&self, arrival: LaneId, turn: Turn) -> Vec<LaneId> {
        let lane = &self.lanes[arrival.0];
        self.possible_lanes(arrival)
            .into_iter()
            .filter(|&t| lane.turn_to(&self.lanes[t.0]) == turn)
            .collect()
    }

    /// Entry lanes offering at least one target lane with `turn`.
    pub fn entry_lanes_with_turn(&self, turn: Turn) -> Vec<LaneId> {
        self.entry_lanes()
            .map(|l| l.id)
            .filter(|&id| !self.lanes_with_turn(id, turn).is_empty())
            .collect()
    }

    /// Entry lane whose approach contains `pos`: within half a tile of the
    /// lane's axis and not past its stop line.
    pub fn entry_lane_at(&self, pos: &Vec2) -> Option<LaneId> {
        let half = 0.5 * self.tile_size;
        self.entry_lanes()
            .find(|lane| {
                let dir = lane.direction_vector();
                let on_axis = geometry::closest_point_on_line(&lane.end_pos, &dir, pos);
                geometry::distance(&on_axis, pos) < half && (pos - lane.end_pos).dot(&dir) <= 0.0
            })
            .map(|lane| lane.id)
    }

    /// Path from the stop line of `from` into `to`.
    pub fn waypoints(&self, from: LaneId, to: LaneId) -> Vec<Vec2> {
        self.lanes[from.0].waypoints_to(&self.lanes[to.0], self.straight_steps, self.tile_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(width: usize, height: usize) -> RoadNetwork {
        RoadNetwork::new(&NetworkConfig {
            width,
            height,
            ..Default::default()
        })
    }

    #[test]
    fn test_single_intersection_is_all_boundary() {
        let net = network(1, 1);
        assert_eq!(net.lanes().count(), 24);
        assert_eq!(net.entry_lanes().count(), 12);
        assert_eq!(net.lanes().filter(|l| l.is_exit()).count(), 12);
    }

    #[test]
    fn test_neighbours_share_lanes() {
        let net = network(2, 1);
        // three lanes each way between the two intersections are merged
        assert_eq!(net.lanes().count(), 48 - 6);
        assert_eq!(net.entry_lanes().count(), 24 - 6);

        let interior: Vec<&Lane> = net.lanes().filter(|l| l.start.is_some() && l.end.is_some()).collect();
        assert_eq!(interior.len(), 6);
        for lane in interior {
            let start = lane.start.unwrap();
            let end = lane.end.unwrap();
            assert_ne!(start.intersection, end.intersection);
            // both intersections resolve the shared lane under their own ids
            let end_intersection = net.intersection(end.intersection);
            assert!(end_intersection.start_lanes().any(|l| l == lane.id));
            let start_intersection = net.intersection(start.intersection);
            assert!(start_intersection.end_lanes().any(|l| l == lane.id));
        }
    }

    #[test]
    fn test_grid_interior_counts() {
        let net = network(2, 2);
        // four shared borders of three lanes in each direction
        assert_eq!(net.lanes().count(), 4 * 24 - 4 * 6);
        assert_eq!(net.entry_lanes().count(), 4 * 12 - 4 * 6);
    }

    #[test]
    fn test_every_entry_lane_reaches_straight() {
        let net = network(1, 1);
        for lane in net.entry_lanes() {
            assert_eq!(net.lanes_with_turn(lane.id, Turn::Straight).len(), 1);
        }
        assert_eq!(net.entry_lanes_with_turn(Turn::Left).len(), 4);
        assert_eq!(net.entry_lanes_with_turn(Turn::Right).len(), 4);
    }

    #[test]
    fn test_entry_lane_lookup() {
        let net = network(2, 2);
        let s = net.tile_size();
        for lane in net.entry_lanes() {
            let behind = lane.end_pos - lane.direction_vector() * (10.0 * s);
            assert_eq!(net.entry_lane_at(&behind), Some(lane.id));
            let past = lane.end_pos + lane.direction_vector() * s;
            assert_ne!(net.entry_lane_at(&past), Some(lane.id));
        }
        assert_eq!(net.entry_lane_at(&Vec2::new(-1e6, -1e6)), None);
    }

    #[test]
    fn test_waypoints_start_within_a_tile() {
        let net = network(1, 1);
        let s = net.tile_size();
        for lane in net.entry_lanes() {
            for target in net.possible_lanes(lane.id) {
                let wps = net.waypoints(lane.id, target);
                assert!(geometry::distance(&wps[0], &lane.end_pos) <= s + 1e-9);
                for pair in wps.windows(2) {
                    assert!((geometry::distance(&pair[0], &pair[1]) - s).abs() < 1e-6);
                }
            }
        }
    }
}
