use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};

pub mod network;
pub mod vehicles;

pub use network::*;
pub use vehicles::*;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub network: NetworkConfig,
    pub vehicles: VehiclesConfig,
    pub simulation: SimulationParams,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Length of one simulation tick in milliseconds.
    pub tick_ms: u64,
    /// How long the console runner simulates, in milliseconds.
    pub duration_ms: u64,
    pub seed: Option<u64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            tick_ms: 20, // 50 ticks per second
            duration_ms: 120_000,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SimError::ConfigIo {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for SimulationConfig {
    fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.vehicles.validate()?;

        if self.simulation.tick_ms == 0 {
            return Err(SimError::invalid("Tick length must be greater than zero"));
        }

        Ok(())
    }
}
