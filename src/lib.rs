//! Reversible bonding engine.
//!
//! Two independent paths share one bonding model:
//! - event-driven square-well dynamics ([`core::Simulation`]) where collisions form and
//!   break single bonds tracked by a [`bonding::BondTable`];
//! - continuum Monte Carlo ([`mc::MonteCarlo`]) where a [`association::BiasVolume`]
//!   predicate defines an [`association::AssociationGraph`] sampled by biased moves.

pub mod association;
pub mod bonding;
pub mod config;
pub mod core;
pub mod error;
pub mod mc;

#[cfg(feature = "python")]
mod python;

pub use error::{Error, Result};
