//! Continuum association: bias volumes, the association graph and what is measured on it.

pub mod bias_volume;
pub mod graph;
pub mod meters;
pub mod smer;

pub use bias_volume::BiasVolume;
pub use graph::AssociationGraph;
pub use meters::{AssociationFractions, SpeciesComposition};
pub use smer::Smer;
