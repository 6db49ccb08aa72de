use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use super::Validate;

/// How vehicles obtain the right to cross an intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntersectionType {
    /// Decentralized tile reservation over the coordination network.
    Reservation,
    /// Fixed-phase traffic lights.
    TrafficLight,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub width: usize,
    pub height: usize,
    pub intersection_type: IntersectionType,
    pub tiles_x: usize,
    pub tiles_y: usize,
    /// Edge length of one reservation tile in metres. Lanes are one tile wide.
    pub tile_size: f64,
    /// Length of the approach and exit lanes, in tiles.
    pub lane_length: usize,
    /// Every incoming lane serves exactly one outgoing lane.
    pub restricted_directions: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            intersection_type: IntersectionType::Reservation,
            tiles_x: 6,
            tiles_y: 6,
            tile_size: 3.0,
            lane_length: 3,
            restricted_directions: false,
        }
    }
}

impl NetworkConfig {
    /// Distance between the offsets of two neighbouring intersections.
    pub fn intersection_spacing(&self) -> f64 {
        self.tile_size * (2 * self.lane_length + self.tiles_x.max(self.tiles_y)) as f64
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SimError::invalid("Network width and height must be at least 1"));
        }

        if self.width * self.height > 244 {
            // channel numbers are intersection id + 11 in a single byte
            return Err(SimError::invalid(format!(
                "Network has {} intersections, at most 244 are addressable",
                self.width * self.height
            )));
        }

        if self.tiles_x != 6 || self.tiles_y != 6 {
            return Err(SimError::invalid("The three-lane layout requires a 6x6 tile grid"));
        }

        if self.tile_size <= 0.0 {
            return Err(SimError::invalid("Tile size must be positive"));
        }

        if self.lane_length < 2 {
            return Err(SimError::invalid("Lane length must be at least 2 tiles"));
        }

        Ok(())
    }
}
