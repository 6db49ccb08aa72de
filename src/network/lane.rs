use super::{IntersectionId, LaneId};
use crate::geometry::{self, Vec2};

/// Waypoints emitted into the target lane after crossing, so the vehicle is
/// clear of the intersection footprint before it re-evaluates its state.
pub const STEPS_INTO_LANE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Screen coordinates: y grows downwards.
    pub fn vector(self) -> Vec2 {
        match self {
            Direction::Up => Vec2::new(0.0, -1.0),
            Direction::Down => Vec2::new(0.0, 1.0),
            Direction::Left => Vec2::new(-1.0, 0.0),
            Direction::Right => Vec2::new(1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Turn {
    Left,
    Straight,
    Right,
}

/// One end of a lane bound to an intersection, with the id the lane has in
/// that intersection's layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneEnd {
    pub intersection: IntersectionId,
    pub local_id: u32,
}

#[derive(Debug, Clone)]
pub struct Lane {
    pub id: LaneId,
    pub start_pos: Vec2,
    pub end_pos: Vec2,
    /// Intersection the lane leaves from; `None` at the network boundary.
    pub start: Option<LaneEnd>,
    /// Intersection the lane feeds into; `None` at the network boundary.
    pub end: Option<LaneEnd>,
    pub(super) replaced: bool,
}

impl Lane {
    pub fn direction_vector(&self) -> Vec2 {
        (self.end_pos - self.start_pos).normalize()
    }

    pub fn direction(&self) -> Direction {
        let d = self.direction_vector();
        if d.x > 0.5 {
            Direction::Right
        } else if d.x < -0.5 {
            Direction::Left
        } else if d.y > 0.5 {
            Direction::Down
        } else {
            Direction::Up
        }
    }

    /// Classifies the turn needed to continue from this lane into `other`.
    pub fn turn_to(&self, other: &Lane) -> Turn {
        let own = self.direction_vector();
        let theirs = other.direction_vector();
        if geometry::approx_eq(&own, &theirs, 1e-9) {
            Turn::Straight
        } else if (own.x + theirs.y).abs() < 1e-9 && (own.y - theirs.x).abs() < 1e-9 {
            Turn::Left
        } else {
            Turn::Right
        }
    }

    /// Entry lanes come from the network boundary and feed an intersection.
    pub fn is_entry(&self) -> bool {
        self.start.is_none() && self.end.is_some()
    }

    /// Exit lanes leave an intersection towards the network boundary.
    pub fn is_exit(&self) -> bool {
        self.end.is_none() && self.start.is_some()
    }

    /// Path across the intersection from this lane's stop line into `target`,
    /// one waypoint per tile.
    pub fn waypoints_to(&self, target: &Lane, straight_steps: usize, tile_size: f64) -> Vec<Vec2> {
        let mut step = self.direction_vector() * tile_size;
        let mut waypoints = Vec::new();
        let mut p = self.end_pos;

        if self.direction() == target.direction() {
            for _ in 0..straight_steps {
                p += step;
                waypoints.push(p);
            }
            p += step;
        } else {
            // the lanes are orthogonal, so the turning point is the projection
            // of our stop line onto the target lane's line
            let corner = geometry::closest_point_on_line(&target.start_pos, &target.direction_vector(), &self.end_pos);
            let ahead = (geometry::distance(&corner, &self.end_pos) / tile_size).round() as usize;
            for _ in 0..ahead {
                p += step;
                waypoints.push(p);
            }

            step = target.direction_vector() * tile_size;
            p += step;
            let across = (geometry::distance(&target.start_pos, &p) / tile_size).round() as usize;
            for _ in 0..across {
                waypoints.push(p);
                p += step;
            }
        }

        for _ in 0..STEPS_INTO_LANE {
            waypoints.push(p);
            p += step;
        }

        waypoints
    }
}
