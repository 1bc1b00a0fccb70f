//! Biased association move: insert a particle into a partner's bias volume, or pull an
//! associated particle out to a random point of the box.

use crate::core::vec3::random_unit;
use crate::error::{Error, Result};
use crate::mc::{pick, McMove, McSystem, Snapshot};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Bond,
    Unbond,
}

/// Association counts before (`i`) and after (`j`) a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Counts {
    ni: usize,
    nai: usize,
    nj: usize,
    naj: usize,
}

/// Detailed-balance ratio of the two-branch proposal.
///
/// With `w = N (N-1) phi`, forward and reverse proposal densities combine to
/// `(ni + w δj / Naj) / (nj + w δi / Nai)`; the special cases with `Naj == 0` or
/// `Nai == 0` fall out of the same expression.
pub fn acceptance_ratio(n: usize, phi: f64, ni: usize, nai: usize, nj: usize, naj: usize) -> f64 {
    let w = (n * n.saturating_sub(1)) as f64 * phi;
    let num = ni as f64 + if nj > 0 && naj > 0 { w / naj as f64 } else { 0.0 };
    let den = nj as f64 + if ni > 0 && nai > 0 { w / nai as f64 } else { 0.0 };
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Trial move that forms and breaks associations with a biased proposal.
#[derive(Debug, Clone)]
pub struct BiasedBondMove {
    branch: Branch,
    snapshot: Option<Snapshot>,
    counts: Counts,
    u_old: f64,
    u_new: f64,
    affected: Vec<usize>,
    scratch: Vec<usize>,
}

impl Default for BiasedBondMove {
    fn default() -> Self {
        Self::new()
    }
}

impl BiasedBondMove {
    pub fn new() -> Self {
        Self {
            branch: Branch::Bond,
            snapshot: None,
            counts: Counts::default(),
            u_old: 0.0,
            u_new: 0.0,
            affected: Vec::with_capacity(1),
            scratch: Vec::new(),
        }
    }
}

impl McMove for BiasedBondMove {
    fn name(&self) -> &'static str {
        "biased_bond"
    }

    fn do_trial(&mut self, sys: &mut McSystem, rng: &mut StdRng) -> Result<bool> {
        let n = sys.len();
        if n < 2 {
            return Err(Error::InvalidParam(
                "biased bond move needs at least two particles".into(),
            ));
        }
        self.affected.clear();
        self.snapshot = None;
        let nai = sys.graph.num_associated();

        self.branch = if rng.random_bool(0.5) {
            Branch::Bond
        } else {
            Branch::Unbond
        };
        let a = match self.branch {
            Branch::Bond => pick(rng, n),
            Branch::Unbond => {
                if nai == 0 {
                    return Ok(false);
                }
                sys.graph.associated()[pick(rng, nai)]
            }
        };

        let snap = Snapshot::take(&sys.config, a);
        let ni = sys.graph.degree(a);
        self.u_old = sys.committed_energy(a);

        match self.branch {
            Branch::Bond => {
                let mut b = pick(rng, n - 1);
                if b >= a {
                    b += 1;
                }
                let bias = *sys.bias();
                bias.insert(&mut sys.config, a, b, rng)?;
            }
            Branch::Unbond => {
                let r = sys.config.boundary.random_position(rng);
                let p = &mut sys.config.particles[a];
                p.r = r;
                if p.orientation.is_some() {
                    p.orientation = Some(random_unit(rng));
                }
            }
        }
        self.snapshot = Some(snap);
        self.affected.push(a);

        self.u_new = sys.trial_energy(a, &mut self.scratch);
        let nj = self.scratch.len();
        let naj = sys.graph.preview_associated_count(a, &self.scratch);
        self.counts = Counts { ni, nai, nj, naj };
        trace!(a, branch = ?self.branch, ni, nai, nj, naj, "biased bond trial");
        Ok(true)
    }

    fn acceptance_bias(&self, sys: &McSystem) -> f64 {
        let c = self.counts;
        acceptance_ratio(sys.len(), sys.volume_fraction(), c.ni, c.nai, c.nj, c.naj)
    }

    fn energy_delta(&self, _sys: &McSystem) -> f64 {
        self.u_new - self.u_old
    }

    fn reject_notify(&mut self, sys: &mut McSystem) -> Result<()> {
        let snap = self.snapshot.take().ok_or_else(|| {
            Error::InvariantViolation("reject_notify without a pending trial".into())
        })?;
        snap.restore(&mut sys.config);
        Ok(())
    }

    fn accept_notify(&mut self, _sys: &mut McSystem) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    fn affected_particles(&self) -> &[usize] {
        &self.affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::BiasVolume;
    use crate::core::boundary::PeriodicBox;
    use crate::core::configuration::Configuration;
    use crate::core::particle::Particle;
    use crate::mc::AssociationPotential;
    use rand::SeedableRng;

    #[test]
    fn two_body_ratios_satisfy_detailed_balance() {
        let phi = 0.05;
        let bond = acceptance_ratio(2, phi, 0, 0, 1, 2);
        let unbond = acceptance_ratio(2, phi, 1, 2, 0, 0);
        assert!((bond - phi).abs() < 1e-15);
        assert!((bond * unbond - 1.0).abs() < 1e-12);
        // moving within the bias volume of the same partner is symmetric
        assert!((acceptance_ratio(2, phi, 1, 2, 1, 2) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn general_ratio_reduces_to_limits() {
        let (n, phi) = (10usize, 0.01);
        let w = (n * (n - 1)) as f64 * phi;
        // Naj == 0
        let a = acceptance_ratio(n, phi, 1, 4, 0, 0);
        assert!((a - 4.0 / w).abs() < 1e-12);
        // Nai == 0
        let a = acceptance_ratio(n, phi, 0, 0, 1, 2);
        assert!((a - w / 2.0).abs() < 1e-12);
    }

    #[test]
    fn rejected_trial_restores_the_snapshot() -> Result<()> {
        let ps = vec![
            Particle::new(0, [1.0, 1.0, 1.0], [0.0; 3], 1.0)?,
            Particle::new(1, [4.0, 4.0, 4.0], [0.0; 3], 1.0)?,
        ];
        let cfg = Configuration::new(ps, PeriodicBox::cubic(8.0)?)?;
        let potential = AssociationPotential {
            epsilon: 1.0,
            core: None,
            bias: BiasVolume::sphere(0.9, 1.0)?,
        };
        let mut sys = McSystem::new(cfg, potential, 1)?;
        let before: Vec<_> = sys.config.particles.iter().map(|p| p.r).collect();
        let mut rng = StdRng::seed_from_u64(5);
        let mut mv = BiasedBondMove::new();
        let mut moved = false;
        for _ in 0..20 {
            if mv.do_trial(&mut sys, &mut rng)? {
                moved = true;
                assert_eq!(mv.affected_particles().len(), 1);
                mv.reject_notify(&mut sys)?;
            }
        }
        assert!(moved);
        let after: Vec<_> = sys.config.particles.iter().map(|p| p.r).collect();
        assert_eq!(before, after);
        assert_eq!(sys.graph.num_associated(), 0);
        Ok(())
    }
}
