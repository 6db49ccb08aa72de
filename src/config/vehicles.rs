use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use super::Validate;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VehiclesConfig {
    pub vehicles_per_hour: f64,
    pub left_turn_rate: f64,
    pub right_turn_rate: f64,
    /// After this long without an initiator round, a waiting vehicle claims the role.
    pub initiator_timeout_ms: u64,
    /// Maximum number of members per platoon, `-1` for unbounded.
    pub max_platoon_size: i32,
    pub kinematics: KinematicsConfig,
    /// Emit per-vehicle state and speed events every tick.
    pub log_events: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KinematicsConfig {
    pub radius: f64,
    /// m/s
    pub max_speed: f64,
    /// m/s²
    pub acceleration: f64,
    /// m/s²
    pub deceleration: f64,
    /// rad/s
    pub max_turn_rate: f64,
}

impl Default for VehiclesConfig {
    fn default() -> Self {
        Self {
            vehicles_per_hour: 200.0,
            left_turn_rate: 0.0,
            right_turn_rate: 0.0,
            initiator_timeout_ms: 5000,
            max_platoon_size: 1,
            kinematics: KinematicsConfig::default(),
            log_events: false,
        }
    }
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            radius: 1.0,
            max_speed: 13.8889, // 50 km/h
            acceleration: 2.0,
            deceleration: 4.0,
            max_turn_rate: FRAC_PI_2,
        }
    }
}

impl VehiclesConfig {
    pub fn platoon_cap(&self) -> Option<usize> {
        usize::try_from(self.max_platoon_size).ok()
    }
}

impl Validate for VehiclesConfig {
    fn validate(&self) -> Result<()> {
        if self.vehicles_per_hour < 0.0 {
            return Err(SimError::invalid("Vehicles per hour must be non-negative"));
        }

        for (name, rate) in [("Left", self.left_turn_rate), ("Right", self.right_turn_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimError::invalid(format!("{} turn rate {} must be in range [0, 1]", name, rate)));
            }
        }

        if self.left_turn_rate + self.right_turn_rate > 1.0 {
            return Err(SimError::invalid("Left and right turn rates must not sum to more than 1"));
        }

        if self.max_platoon_size == 0 || self.max_platoon_size < -1 {
            return Err(SimError::invalid("Max platoon size must be positive or -1 for unbounded"));
        }

        let k = &self.kinematics;
        if k.radius <= 0.0 {
            return Err(SimError::invalid("Vehicle radius must be positive"));
        }

        if k.max_speed <= 0.0 || k.acceleration <= 0.0 || k.deceleration <= 0.0 || k.max_turn_rate <= 0.0 {
            return Err(SimError::invalid("Vehicle kinematic limits must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platoon_cap() {
        let mut config = VehiclesConfig::default();
        assert_eq!(config.platoon_cap(), Some(1));
        config.max_platoon_size = -1;
        assert_eq!(config.platoon_cap(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_turn_rates_must_fit() {
        let config = VehiclesConfig {
            left_turn_rate: 0.7,
            right_turn_rate: 0.4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
