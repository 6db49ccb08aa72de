pub mod channel;
pub mod config;
pub mod error;
pub mod geometry;
pub mod network;
pub mod peer;
pub mod simulation;
pub mod vehicle;

pub use config::SimulationConfig;
pub use error::{Result, SimError};
pub use peer::CoordinatorPeer;
pub use simulation::World;
pub use vehicle::{VehicleController, VehicleId, VehicleState};
