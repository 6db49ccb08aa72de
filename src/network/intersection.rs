use super::lane::{Direction, Lane, LaneEnd};
use super::tiles::TileGrid;
use super::{IntersectionId, LaneId};
use crate::config::NetworkConfig;
use crate::geometry::Vec2;
use std::collections::BTreeMap;

const INDEX_LEFT: usize = 0;
const INDEX_STRAIGHT: usize = 1;
const INDEX_RIGHT: usize = 2;

const GREEN_MS: u64 = 9_000;
const YELLOW_MS: u64 = 3_000;
const RED_MS: u64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightPhase {
    Red,
    Yellow,
    Green,
}

/// Outgoing lanes reachable from one incoming lane, by local id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOptions {
    /// The lane served in every layout; straight ahead unless directions are restricted.
    pub main: u32,
    pub others: Vec<u32>,
}

impl TurnOptions {
    pub fn all(&self) -> impl Iterator<Item = u32> + '_ {
        std::iter::once(self.main).chain(self.others.iter().copied())
    }
}

#[derive(Debug, Clone)]
pub struct Intersection {
    pub id: IntersectionId,
    pub offset: Vec2,
    start_lanes: BTreeMap<u32, LaneId>,
    end_lanes: BTreeMap<u32, LaneId>,
    turns: BTreeMap<u32, TurnOptions>,
    tiles: TileGrid,
    last_initiator_ms: u64,
}

impl Intersection {
    /// Builds the three-lane layout at `offset`, appending its lanes to `lanes`.
    pub fn new(id: IntersectionId, offset: Vec2, config: &NetworkConfig, lanes: &mut Vec<Lane>) -> Self {
        let mut intersection = Self {
            id,
            offset,
            start_lanes: BTreeMap::new(),
            end_lanes: BTreeMap::new(),
            turns: BTreeMap::new(),
            tiles: TileGrid::new(config.tiles_x, config.tiles_y, config.tile_size, offset),
            last_initiator_ms: 0,
        };

        let mut layout = LayoutBuilder {
            intersection: &mut intersection,
            lanes,
            tile_size: config.tile_size,
            lane_length: config.lane_length as f64,
            next_local_id: 1,
        };
        layout.build(config.restricted_directions);

        intersection
    }

    pub fn tiles(&self) -> &TileGrid {
        &self.tiles
    }

    /// Channel on which this intersection's coordination network runs.
    pub fn channel(&self) -> u8 {
        ((self.id.0 + 11) & 0xFF) as u8
    }

    pub fn start_lanes(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.start_lanes.values().copied()
    }

    pub fn end_lanes(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.end_lanes.values().copied()
    }

    pub fn end_lane(&self, local_id: u32) -> Option<LaneId> {
        self.end_lanes.get(&local_id).copied()
    }

    pub fn turn_options(&self, local_id: u32) -> Option<&TurnOptions> {
        self.turns.get(&local_id)
    }

    /// Swaps the lane stored under `local_id` for `replacement` after two
    /// intersections were stitched together.
    pub(super) fn replace_lane(&mut self, local_id: u32, replacement: LaneId) {
        let mut found = false;
        for map in [&mut self.start_lanes, &mut self.end_lanes] {
            if let Some(slot) = map.get_mut(&local_id) {
                *slot = replacement;
                found = true;
            }
        }
        assert!(found, "intersection {:?} has no lane with local id {}", self.id, local_id);
    }

    pub fn last_initiator_ms(&self) -> u64 {
        self.last_initiator_ms
    }

    pub fn set_last_initiator_ms(&mut self, ms: u64) {
        self.last_initiator_ms = ms;
    }

    /// Fixed-cycle light state for traffic approaching in `direction`.
    /// Each direction owns one 15s slot out of four.
    pub fn light_phase(&self, direction: Direction, now_ms: u64) -> LightPhase {
        let slot_offset = match direction {
            Direction::Right => 0,
            Direction::Left => 1,
            Direction::Down => 2,
            Direction::Up => 3,
        };

        let cycle = GREEN_MS + YELLOW_MS + RED_MS;
        let slot = now_ms / cycle;
        if slot % 4 != slot_offset {
            return LightPhase::Red;
        }

        let in_slot = now_ms - slot * cycle;
        if in_slot < GREEN_MS {
            LightPhase::Green
        } else if in_slot < GREEN_MS + YELLOW_MS {
            LightPhase::Yellow
        } else {
            LightPhase::Red
        }
    }
}

struct LayoutBuilder<'a> {
    intersection: &'a mut Intersection,
    lanes: &'a mut Vec<Lane>,
    tile_size: f64,
    lane_length: f64,
    next_local_id: u32,
}

impl LayoutBuilder<'_> {
    fn build(&mut self, restricted: bool) {
        use Direction::*;

        // Outgoing lanes, positions relative to the tile grid in tiles
        let all_left = [
            self.add_end_lane((-0.5, 2.5), Left),
            self.add_end_lane((-0.5, 1.5), Left),
            self.add_end_lane((-0.5, 0.5), Left),
        ];
        let all_up = [
            self.add_end_lane((3.5, -0.5), Up),
            self.add_end_lane((4.5, -0.5), Up),
            self.add_end_lane((5.5, -0.5), Up),
        ];
        let all_down = [
            self.add_end_lane((2.5, 6.5), Down),
            self.add_end_lane((1.5, 6.5), Down),
            self.add_end_lane((0.5, 6.5), Down),
        ];
        let all_right = [
            self.add_end_lane((6.5, 3.5), Right),
            self.add_end_lane((6.5, 4.5), Right),
            self.add_end_lane((6.5, 5.5), Right),
        ];

        if restricted {
            self.add_start_lane((2.5, -0.5), Down, all_right[INDEX_LEFT], &[]);
            self.add_start_lane((1.5, -0.5), Down, all_down[INDEX_STRAIGHT], &[]);
            self.add_start_lane((0.5, -0.5), Down, all_left[INDEX_RIGHT], &[]);

            self.add_start_lane((6.5, 2.5), Left, all_down[INDEX_LEFT], &[]);
            self.add_start_lane((6.5, 1.5), Left, all_left[INDEX_STRAIGHT], &[]);
            self.add_start_lane((6.5, 0.5), Left, all_up[INDEX_RIGHT], &[]);

            self.add_start_lane((-0.5, 3.5), Right, all_up[INDEX_LEFT], &[]);
            self.add_start_lane((-0.5, 4.5), Right, all_right[INDEX_STRAIGHT], &[]);
            self.add_start_lane((-0.5, 5.5), Right, all_down[INDEX_RIGHT], &[]);

            self.add_start_lane((3.5, 6.5), Up, all_left[INDEX_LEFT], &[]);
            self.add_start_lane((4.5, 6.5), Up, all_up[INDEX_STRAIGHT], &[]);
            self.add_start_lane((5.5, 6.5), Up, all_right[INDEX_RIGHT], &[]);
        } else {
            // the inner lane may also turn left, the outer one right
            self.add_start_lane((2.5, -0.5), Down, all_down[INDEX_LEFT], &all_right);
            self.add_start_lane((1.5, -0.5), Down, all_down[INDEX_STRAIGHT], &[]);
            self.add_start_lane((0.5, -0.5), Down, all_down[INDEX_RIGHT], &all_left);

            self.add_start_lane((6.5, 2.5), Left, all_left[INDEX_LEFT], &all_down);
            self.add_start_lane((6.5, 1.5), Left, all_left[INDEX_STRAIGHT], &[]);
            self.add_start_lane((6.5, 0.5), Left, all_left[INDEX_RIGHT], &all_up);

            self.add_start_lane((-0.5, 3.5), Right, all_right[INDEX_LEFT], &all_up);
            self.add_start_lane((-0.5, 4.5), Right, all_right[INDEX_STRAIGHT], &[]);
            self.add_start_lane((-0.5, 5.5), Right, all_right[INDEX_RIGHT], &all_down);

            self.add_start_lane((3.5, 6.5), Up, all_up[INDEX_LEFT], &all_left);
            self.add_start_lane((4.5, 6.5), Up, all_up[INDEX_STRAIGHT], &[]);
            self.add_start_lane((5.5, 6.5), Up, all_up[INDEX_RIGHT], &all_right);
        }
    }

    fn to_world(&self, rel: (f64, f64)) -> Vec2 {
        self.intersection.offset + Vec2::new(rel.0, rel.1) * self.tile_size
    }

    fn push_lane(&mut self, start_pos: Vec2, end_pos: Vec2, start: Option<LaneEnd>, end: Option<LaneEnd>) -> LaneId {
        let id = LaneId(self.lanes.len());
        self.lanes.push(Lane {
            id,
            start_pos,
            end_pos,
            start,
            end,
            replaced: false,
        });
        id
    }

    fn next_local_id(&mut self) -> u32 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }

    fn add_end_lane(&mut self, rel_start: (f64, f64), direction: Direction) -> u32 {
        let local_id = self.next_local_id();
        let start_pos = self.to_world(rel_start);
        let end_pos = start_pos + direction.vector() * self.tile_size * self.lane_length;
        let start = LaneEnd {
            intersection: self.intersection.id,
            local_id,
        };
        let lane = self.push_lane(start_pos, end_pos, Some(start), None);
        self.intersection.end_lanes.insert(local_id, lane);
        local_id
    }

    fn add_start_lane(&mut self, rel_end: (f64, f64), direction: Direction, main: u32, others: &[u32]) {
        let local_id = self.next_local_id();
        let end_pos = self.to_world(rel_end);
        let start_pos = end_pos - direction.vector() * self.tile_size * self.lane_length;
        let end = LaneEnd {
            intersection: self.intersection.id,
            local_id,
        };
        let lane = self.push_lane(start_pos, end_pos, None, Some(end));
        self.intersection.start_lanes.insert(local_id, lane);
        self.intersection.turns.insert(
            local_id,
            TurnOptions {
                main,
                others: others.to_vec(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::lane::Turn;

    fn build(restricted: bool) -> (Intersection, Vec<Lane>) {
        let config = NetworkConfig {
            restricted_directions: restricted,
            ..Default::default()
        };
        let mut lanes = Vec::new();
        let intersection = Intersection::new(IntersectionId(0), Vec2::new(36.0, 36.0), &config, &mut lanes);
        (intersection, lanes)
    }

    #[test]
    fn test_layout_has_twelve_lanes_each_way() {
        let (intersection, lanes) = build(false);
        assert_eq!(intersection.start_lanes().count(), 12);
        assert_eq!(intersection.end_lanes().count(), 12);
        assert_eq!(lanes.len(), 24);
        assert!(intersection.start_lanes().all(|l| lanes[l.0].is_entry()));
        assert!(intersection.end_lanes().all(|l| lanes[l.0].is_exit()));
    }

    #[test]
    fn test_unrestricted_turns() {
        let (intersection, lanes) = build(false);
        for lane_id in intersection.start_lanes() {
            let lane = &lanes[lane_id.0];
            let local = lane.end.map(|e| e.local_id).unwrap();
            let options = intersection.turn_options(local).unwrap();

            let main = &lanes[intersection.end_lane(options.main).unwrap().0];
            assert_eq!(lane.turn_to(main), Turn::Straight);

            let turns: Vec<Turn> = options
                .others
                .iter()
                .map(|&o| lane.turn_to(&lanes[intersection.end_lane(o).unwrap().0]))
                .collect();
            assert!(turns.is_empty() || turns.len() == 3);
            assert!(turns.windows(2).all(|w| w[0] == w[1]));
        }
    }

    #[test]
    fn test_restricted_lanes_have_single_target() {
        let (intersection, lanes) = build(true);
        let mut counts = [0usize; 3];
        for lane_id in intersection.start_lanes() {
            let lane = &lanes[lane_id.0];
            let options = intersection.turn_options(lane.end.unwrap().local_id).unwrap();
            assert!(options.others.is_empty());
            match lane.turn_to(&lanes[intersection.end_lane(options.main).unwrap().0]) {
                Turn::Left => counts[0] += 1,
                Turn::Straight => counts[1] += 1,
                Turn::Right => counts[2] += 1,
            }
        }
        assert_eq!(counts, [4, 4, 4]);
    }

    #[test]
    fn test_light_phases_cycle_per_direction() {
        let (intersection, _) = build(false);
        assert_eq!(intersection.light_phase(Direction::Right, 0), LightPhase::Green);
        assert_eq!(intersection.light_phase(Direction::Right, 9_500), LightPhase::Yellow);
        assert_eq!(intersection.light_phase(Direction::Right, 13_000), LightPhase::Red);
        assert_eq!(intersection.light_phase(Direction::Left, 0), LightPhase::Red);
        assert_eq!(intersection.light_phase(Direction::Left, 15_000), LightPhase::Green);
        assert_eq!(intersection.light_phase(Direction::Up, 45_000), LightPhase::Green);
        assert_eq!(intersection.light_phase(Direction::Right, 60_000), LightPhase::Green);
    }

    #[test]
    fn test_channel() {
        let (intersection, _) = build(false);
        assert_eq!(intersection.channel(), 11);
    }
}
