//! Degree-1 bonding for the event-driven square-well path.

pub mod bond_table;
pub mod square_well;

pub use bond_table::{BondTable, PairBonding};
pub use square_well::{BumpOutcome, CollisionKind, InteractionTable, Prediction, Shell, SquareWell};
