//! Association observables for both the event-driven and the Monte Carlo paths.

use crate::association::graph::AssociationGraph;
use crate::association::smer::size_histogram;
use crate::bonding::bond_table::BondTable;
use crate::core::particle::Particle;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Fraction of particles found in monomers, dimers and larger clusters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AssociationFractions {
    pub monomer: f64,
    pub dimer: f64,
    pub oligomer: f64,
}

impl AssociationFractions {
    /// Particle-weighted fractions from the graph's connected components.
    pub fn from_graph(graph: &AssociationGraph) -> Self {
        let n = graph.len();
        if n == 0 {
            return Self::default();
        }
        let hist = size_histogram(graph);
        let mut by_particles = [0usize; 3];
        for (size, &count) in hist.iter().enumerate().skip(1) {
            by_particles[(size - 1).min(2)] += size * count;
        }
        let n = n as f64;
        Self {
            monomer: by_particles[0] as f64 / n,
            dimer: by_particles[1] as f64 / n,
            oligomer: by_particles[2] as f64 / n,
        }
    }

    /// Fractions under a degree-1 bond table (no oligomers).
    pub fn from_bonds(bonds: &BondTable) -> Self {
        let n = bonds.len();
        if n == 0 {
            return Self::default();
        }
        let bonded = bonds.bonded_count() as f64 / n as f64;
        Self {
            monomer: 1.0 - bonded,
            dimer: bonded,
            oligomer: 0.0,
        }
    }
}

/// Molecule counts resolved by species, as in a reaction-equilibrium dimer meter.
///
/// A molecule is either a monomer or a bonded pair; fractions are relative to the total
/// molecule count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpeciesComposition {
    pub monomers: BTreeMap<u32, usize>,
    /// Keyed by `(min species, max species)`.
    pub dimers: BTreeMap<(u32, u32), usize>,
}

impl SpeciesComposition {
    pub fn measure(particles: &[Particle], bonds: &BondTable) -> Result<Self> {
        if particles.len() != bonds.len() {
            return Err(Error::InvalidParam(format!(
                "bond table covers {} particles, got {}",
                bonds.len(),
                particles.len()
            )));
        }
        let mut out = Self::default();
        for (i, p) in particles.iter().enumerate() {
            if !bonds.is_bonded(i) {
                *out.monomers.entry(p.species).or_default() += 1;
            }
        }
        for (i, j) in bonds.pairs() {
            let (a, b) = (particles[i].species, particles[j].species);
            *out.dimers.entry((a.min(b), a.max(b))).or_default() += 1;
        }
        Ok(out)
    }

    pub fn molecules(&self) -> usize {
        self.monomers.values().sum::<usize>() + self.dimers.values().sum::<usize>()
    }

    pub fn monomer_fraction(&self, species: u32) -> f64 {
        self.fraction(self.monomers.get(&species).copied().unwrap_or(0))
    }

    pub fn dimer_fraction(&self, a: u32, b: u32) -> f64 {
        self.fraction(self.dimers.get(&(a.min(b), a.max(b))).copied().unwrap_or(0))
    }

    fn fraction(&self, count: usize) -> f64 {
        match self.molecules() {
            0 => 0.0,
            m => count as f64 / m as f64,
        }
    }
}
