//! Continuum association Monte Carlo: system state, the move contract and the driver.

pub mod biased_bond;
pub mod displace;
pub mod integrator;
pub mod smer_moves;

pub use biased_bond::BiasedBondMove;
pub use displace::{DisplaceMove, RotateMove};
pub use integrator::{MonteCarlo, MoveStats};
pub use smer_moves::{SmerRotateMove, SmerTranslateMove};

use crate::association::smer::size_histogram;
use crate::association::{AssociationGraph, BiasVolume};
use crate::config::McConfig;
use crate::core::boundary::PeriodicBox;
use crate::core::configuration::Configuration;
use crate::core::neighbors::{AllPairs, NeighborSource};
use crate::core::particle::Particle;
use crate::core::vec3::{norm_sq, random_unit, Vec3};
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{info, warn};

/// Association energy model: `-epsilon` per associated pair, optional hard core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssociationPotential {
    pub epsilon: f64,
    pub core: Option<f64>,
    pub bias: BiasVolume,
}

/// Configuration plus the committed association graph it implies.
pub struct McSystem {
    pub config: Configuration,
    pub graph: AssociationGraph,
    pub potential: AssociationPotential,
    neighbors: Box<dyn NeighborSource>,
    /// Largest cluster a trial may create; `None` leaves cluster size unbounded.
    max_chain_length: Option<usize>,
}

impl McSystem {
    /// Wrap an existing configuration and build its graph.
    ///
    /// Fails if the bias volume does not fit the box, orientations are missing for an
    /// oriented bias, cores overlap, or the configuration already exceeds `max_degree`.
    pub fn new(
        config: Configuration,
        potential: AssociationPotential,
        max_degree: usize,
    ) -> Result<Self> {
        Self::with_neighbors(config, potential, max_degree, Box::new(AllPairs))
    }

    pub fn with_neighbors(
        config: Configuration,
        potential: AssociationPotential,
        max_degree: usize,
        neighbors: Box<dyn NeighborSource>,
    ) -> Result<Self> {
        if config.len() < 2 {
            return Err(Error::InvalidParam("at least two particles are required".into()));
        }
        if !potential.epsilon.is_finite() {
            return Err(Error::InvalidParam("epsilon must be finite".into()));
        }
        let bias = potential.bias;
        bias.check_box(&config.boundary)?;
        if bias.range() > 0.9 * config.boundary.half_min_length() {
            warn!(
                range = bias.range(),
                half_box = config.boundary.half_min_length(),
                "bias volume is close to half the box"
            );
        }
        if bias.needs_orientation() && config.particles.iter().any(|p| p.orientation.is_none()) {
            return Err(Error::InvalidParam(
                "oriented bias volume requires every particle to carry an orientation".into(),
            ));
        }

        let mut graph = AssociationGraph::new(config.len(), max_degree)?;
        graph.initialize(&config, &bias, neighbors.as_ref())?;
        let sys = Self {
            config,
            graph,
            potential,
            neighbors,
            max_chain_length: None,
        };
        for i in 0..sys.config.len() {
            if sys.overlaps_core(i) {
                return Err(Error::InvalidParam(format!(
                    "particle {i} overlaps another hard core"
                )));
            }
        }
        info!(
            particles = sys.config.len(),
            box_volume = sys.config.boundary.volume(),
            bias_volume = bias.volume(),
            associated = sys.graph.num_associated(),
            "association system ready"
        );
        Ok(sys)
    }

    /// Random system from a configuration: no core overlaps and no initial associations.
    pub fn from_config(cfg: &McConfig, rng: &mut StdRng) -> Result<Self> {
        cfg.validate()?;
        let boundary = PeriodicBox::new(cfg.box_size)?;
        let bias = cfg.bias.build()?;
        bias.check_box(&boundary)?;

        let max_attempts = 100_000usize;
        let mut particles: Vec<Particle> = Vec::with_capacity(cfg.num_particles);
        for id in 0..cfg.num_particles as u32 {
            let mut attempts = 0usize;
            let (r, e) = loop {
                if attempts >= max_attempts {
                    return Err(Error::SamplingFailed {
                        what: "unassociated initial position",
                        attempts,
                    });
                }
                attempts += 1;
                let r = boundary.random_position(rng);
                let e = cfg.oriented.then(|| random_unit(rng));
                let clash = particles.iter().any(|p| {
                    let d = boundary.displacement(&r, &p.r);
                    cfg.core.is_some_and(|c| norm_sq(&d) < c * c)
                        || bias.contains(&d, e.as_ref(), p.orientation.as_ref())
                });
                if !clash {
                    break (r, e);
                }
            };
            let mut p = Particle::new(id, r, [0.0; 3], 1.0)?;
            if let Some(e) = e {
                p = p.with_orientation(e)?;
            }
            particles.push(p);
        }

        let potential = AssociationPotential {
            epsilon: cfg.epsilon,
            core: cfg.core,
            bias,
        };
        let mut sys = Self::new(Configuration::new(particles, boundary)?, potential, cfg.max_degree)?;
        sys.set_max_chain_length(cfg.max_chain_length)?;
        Ok(sys)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.config.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.config.is_empty()
    }

    pub fn max_chain_length(&self) -> Option<usize> {
        self.max_chain_length
    }

    /// Cap cluster size for all later trials. The committed graph must already respect it.
    pub fn set_max_chain_length(&mut self, max: Option<usize>) -> Result<()> {
        if let Some(m) = max {
            if m < 2 {
                return Err(Error::InvalidParam("max_chain_length must be >= 2".into()));
            }
            let largest = size_histogram(&self.graph).len() - 1;
            if largest > m {
                return Err(Error::InvalidParam(format!(
                    "configuration already holds a {largest}-mer, above the cap of {m}"
                )));
            }
        }
        self.max_chain_length = max;
        Ok(())
    }

    pub fn bias(&self) -> &BiasVolume {
        &self.potential.bias
    }

    /// Bias volume over box volume.
    pub fn volume_fraction(&self) -> f64 {
        self.potential.bias.volume() / self.config.boundary.volume()
    }

    /// Energy of the committed state.
    pub fn total_energy(&self) -> f64 {
        -self.potential.epsilon * self.graph.num_edges() as f64
    }

    /// Committed energy of particle `i`.
    pub fn committed_energy(&self, i: usize) -> f64 {
        -self.potential.epsilon * self.graph.degree(i) as f64
    }

    /// Energy of particle `i` in the current, possibly trial, configuration.
    ///
    /// `partners` receives `i`'s geometric partners. Returns `+inf` on a core overlap,
    /// when adopting those partners would exceed the degree bound anywhere, or when `i`
    /// would end up in a cluster longer than `max_chain_length`.
    pub fn trial_energy(&self, i: usize, partners: &mut Vec<usize>) -> f64 {
        self.scan(i, partners);
        if self.overlaps_core(i) || !self.graph.preview_degrees_ok(i, partners) {
            return f64::INFINITY;
        }
        if let Some(max) = self.max_chain_length {
            if self.graph.preview_cluster_size(i, partners) > max {
                return f64::INFINITY;
            }
        }
        -self.potential.epsilon * partners.len() as f64
    }

    /// Geometric partners of `i` in the current configuration.
    pub fn scan(&self, i: usize, partners: &mut Vec<usize>) {
        self.graph.scan(
            i,
            &self.config,
            &self.potential.bias,
            self.neighbors.as_ref(),
            partners,
        );
    }

    /// Patch the committed graph after an accepted move.
    pub fn commit(&mut self, moved: &[usize]) -> Result<()> {
        self.graph.on_move_accepted(
            moved,
            &self.config,
            &self.potential.bias,
            self.neighbors.as_ref(),
        )
    }

    /// Rebuild the graph from scratch and compare with the committed one.
    pub fn validate(&self) -> Result<()> {
        self.graph.validate()?;
        let mut fresh = AssociationGraph::new(self.len(), self.graph.max_degree())?;
        fresh.initialize(&self.config, &self.potential.bias, self.neighbors.as_ref())?;
        let mut a = Vec::new();
        let mut b = Vec::new();
        for p in 0..self.len() {
            a.clear();
            a.extend_from_slice(self.graph.associated_with(p));
            a.sort_unstable();
            b.clear();
            b.extend_from_slice(fresh.associated_with(p));
            b.sort_unstable();
            if a != b {
                return Err(Error::InvariantViolation(format!(
                    "committed partners of {p} ({a:?}) differ from geometry ({b:?})"
                )));
            }
        }
        if let Some(max) = self.max_chain_length {
            let largest = size_histogram(&self.graph).len() - 1;
            if largest > max {
                return Err(Error::InvariantViolation(format!(
                    "{largest}-mer exceeds max_chain_length {max}"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn overlaps_core(&self, i: usize) -> bool {
        let Some(core) = self.potential.core else {
            return false;
        };
        let core_sq = core * core;
        (0..self.len()).any(|j| j != i && norm_sq(&self.config.displacement(i, j)) < core_sq)
    }
}

/// Position and orientation of one particle before a trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Snapshot {
    pub index: usize,
    pub r: Vec3,
    pub orientation: Option<Vec3>,
}

impl Snapshot {
    pub fn take(cfg: &Configuration, index: usize) -> Self {
        let p = &cfg.particles[index];
        Self {
            index,
            r: p.r,
            orientation: p.orientation,
        }
    }

    /// Put the particle back exactly as it was.
    pub fn restore(&self, cfg: &mut Configuration) {
        let p = &mut cfg.particles[self.index];
        p.r = self.r;
        p.orientation = self.orientation;
    }
}

/// Monte Carlo trial move contract.
///
/// The driver calls `do_trial`; if it returns `true` the move has changed the
/// configuration and the driver reads `acceptance_bias` and `energy_delta`, then calls
/// exactly one of `accept_notify` or `reject_notify`. Trials never touch the graph.
pub trait McMove {
    fn name(&self) -> &'static str;

    /// Perform the trial. `Ok(false)` means the trial was rejected without any change.
    fn do_trial(&mut self, sys: &mut McSystem, rng: &mut StdRng) -> Result<bool>;

    /// Ratio of reverse to forward proposal probabilities.
    fn acceptance_bias(&self, sys: &McSystem) -> f64;

    fn energy_delta(&self, sys: &McSystem) -> f64;

    fn accept_notify(&mut self, _sys: &mut McSystem) -> Result<()> {
        Ok(())
    }

    fn reject_notify(&mut self, sys: &mut McSystem) -> Result<()>;

    fn affected_particles(&self) -> &[usize];
}

/// Uniformly chosen particle index.
#[inline]
pub(crate) fn pick<R: Rng + ?Sized>(rng: &mut R, n: usize) -> usize {
    rng.random_range(0..n)
}
