//! Simulation substrate: particles, boundaries, neighbor service, events and the
//! event-driven driver.

pub mod boundary;
pub mod configuration;
pub mod event;
pub mod neighbors;
pub mod particle;
pub mod sim;
pub mod vec3;

pub use boundary::PeriodicBox;
pub use configuration::Configuration;
pub use event::{Event, EventKind};
pub use neighbors::{AllPairs, NeighborSource};
pub use particle::Particle;
pub use sim::Simulation;
