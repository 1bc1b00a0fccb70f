//! Rigid moves of whole clusters: translation, and rotation about the cluster centroid.
//!
//! The cluster is the connected component of a uniformly chosen particle. A trial that
//! changes any association of a member gets infinite energy, so an accepted move leaves
//! the component intact and the reverse trial picks the same cluster with the same
//! probability.

use crate::association::smer::cluster_of;
use crate::core::vec3::{add, normalized, random_unit, rotate, scale, sub, Vec3};
use crate::error::{Error, Result};
use crate::mc::{pick, McMove, McSystem, Snapshot};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::trace;

#[derive(Debug, Clone, Default)]
struct ClusterTrial {
    members: Vec<usize>,
    snapshots: Vec<Snapshot>,
    pending: bool,
    du: f64,
    fresh: Vec<usize>,
    committed: Vec<usize>,
}

impl ClusterTrial {
    fn begin(&mut self, sys: &McSystem, rng: &mut StdRng) {
        let i = pick(rng, sys.len());
        self.members = cluster_of(&sys.graph, i);
        self.snapshots.clear();
        self.snapshots
            .extend(self.members.iter().map(|&m| Snapshot::take(&sys.config, m)));
        self.pending = true;
    }

    fn finish(&mut self, sys: &McSystem) {
        self.du = 0.0;
        for &m in &self.members {
            if sys.overlaps_core(m) {
                self.du = f64::INFINITY;
                return;
            }
            sys.scan(m, &mut self.fresh);
            self.committed.clear();
            self.committed.extend_from_slice(sys.graph.associated_with(m));
            self.committed.sort_unstable();
            if self.fresh != self.committed {
                self.du = f64::INFINITY;
                return;
            }
        }
    }

    fn reject(&mut self, sys: &mut McSystem) -> Result<()> {
        if !self.pending {
            return Err(Error::InvariantViolation(
                "reject_notify without a pending trial".into(),
            ));
        }
        self.pending = false;
        for snap in &self.snapshots {
            snap.restore(&mut sys.config);
        }
        Ok(())
    }
}

/// Translate a whole cluster by a uniform displacement in `[-step, step]` per axis.
#[derive(Debug, Clone)]
pub struct SmerTranslateMove {
    step: f64,
    trial: ClusterTrial,
}

impl SmerTranslateMove {
    pub fn new(step: f64) -> Result<Self> {
        if !step.is_finite() || step <= 0.0 {
            return Err(Error::InvalidParam("smer displacement step must be > 0".into()));
        }
        Ok(Self {
            step,
            trial: ClusterTrial::default(),
        })
    }
}

impl McMove for SmerTranslateMove {
    fn name(&self) -> &'static str {
        "smer_translate"
    }

    fn do_trial(&mut self, sys: &mut McSystem, rng: &mut StdRng) -> Result<bool> {
        self.trial.begin(sys, rng);
        let mut d = [0.0_f64; 3];
        for x in &mut d {
            *x = rng.random_range(-self.step..=self.step);
        }
        for &m in &self.trial.members {
            let mut r = add(&sys.config.particles[m].r, &d);
            sys.config.boundary.wrap(&mut r);
            sys.config.particles[m].r = r;
        }
        self.trial.finish(sys);
        trace!(size = self.trial.members.len(), du = self.trial.du, "smer translate trial");
        Ok(true)
    }

    fn acceptance_bias(&self, _sys: &McSystem) -> f64 {
        1.0
    }

    fn energy_delta(&self, _sys: &McSystem) -> f64 {
        self.trial.du
    }

    fn accept_notify(&mut self, _sys: &mut McSystem) -> Result<()> {
        self.trial.pending = false;
        Ok(())
    }

    fn reject_notify(&mut self, sys: &mut McSystem) -> Result<()> {
        self.trial.reject(sys)
    }

    fn affected_particles(&self) -> &[usize] {
        &self.trial.members
    }
}

/// Rotate a whole cluster, positions and orientations, about its centroid by an angle
/// in `[-max_angle, max_angle]` around a random axis.
#[derive(Debug, Clone)]
pub struct SmerRotateMove {
    max_angle: f64,
    trial: ClusterTrial,
    /// Member positions unwrapped along bonds, relative to the first member.
    rel: Vec<Vec3>,
}

impl SmerRotateMove {
    pub fn new(max_angle: f64) -> Result<Self> {
        if !max_angle.is_finite() || max_angle <= 0.0 {
            return Err(Error::InvalidParam("smer rotation step must be > 0".into()));
        }
        Ok(Self {
            max_angle,
            trial: ClusterTrial::default(),
            rel: Vec::new(),
        })
    }

    fn unwrap_members(&mut self, sys: &McSystem) -> Result<()> {
        let members = &self.trial.members;
        self.rel.clear();
        self.rel.push([0.0; 3]);
        for k in 1..members.len() {
            let m = members[k];
            let j = members[..k]
                .iter()
                .position(|&q| sys.graph.are_associated(q, m))
                .ok_or_else(|| {
                    Error::InvariantViolation(format!("cluster member {m} has no earlier partner"))
                })?;
            let r = add(&self.rel[j], &sys.config.displacement(members[j], m));
            self.rel.push(r);
        }
        Ok(())
    }
}

impl McMove for SmerRotateMove {
    fn name(&self) -> &'static str {
        "smer_rotate"
    }

    fn do_trial(&mut self, sys: &mut McSystem, rng: &mut StdRng) -> Result<bool> {
        self.trial.begin(sys, rng);
        self.unwrap_members(sys)?;
        let n = self.rel.len() as f64;
        let sum = self.rel.iter().fold([0.0; 3], |acc, r| add(&acc, r));
        let centroid = scale(&sum, 1.0 / n);
        let axis = random_unit(rng);
        let angle = rng.random_range(-self.max_angle..=self.max_angle);

        let origin = sys.config.particles[self.trial.members[0]].r;
        for (k, &m) in self.trial.members.iter().enumerate() {
            let arm = rotate(&sub(&self.rel[k], &centroid), &axis, angle);
            let mut r = add(&add(&origin, &centroid), &arm);
            sys.config.boundary.wrap(&mut r);
            let p = &mut sys.config.particles[m];
            p.r = r;
            if let Some(e) = p.orientation {
                p.orientation = Some(normalized(&rotate(&e, &axis, angle)).unwrap_or(e));
            }
        }
        self.trial.finish(sys);
        trace!(size = self.trial.members.len(), angle, du = self.trial.du, "smer rotate trial");
        Ok(true)
    }

    fn acceptance_bias(&self, _sys: &McSystem) -> f64 {
        1.0
    }

    fn energy_delta(&self, _sys: &McSystem) -> f64 {
        self.trial.du
    }

    fn accept_notify(&mut self, _sys: &mut McSystem) -> Result<()> {
        self.trial.pending = false;
        Ok(())
    }

    fn reject_notify(&mut self, sys: &mut McSystem) -> Result<()> {
        self.trial.reject(sys)
    }

    fn affected_particles(&self) -> &[usize] {
        &self.trial.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::BiasVolume;
    use crate::core::boundary::PeriodicBox;
    use crate::core::configuration::Configuration;
    use crate::core::particle::Particle;
    use crate::core::vec3::norm_sq;
    use crate::mc::AssociationPotential;
    use rand::SeedableRng;

    /// Trimer 0-1-2 along x plus a distant monomer.
    fn trimer_and_monomer() -> Result<McSystem> {
        let points = [
            [2.0, 5.0, 5.0],
            [3.0, 5.0, 5.0],
            [4.0, 5.0, 5.0],
            [8.0, 8.5, 8.0],
        ];
        let ps = points
            .iter()
            .enumerate()
            .map(|(i, &r)| Particle::new(i as u32, r, [0.0; 3], 1.0))
            .collect::<Result<Vec<_>>>()?;
        let cfg = Configuration::new(ps, PeriodicBox::cubic(10.0)?)?;
        let potential = AssociationPotential {
            epsilon: 1.0,
            core: Some(0.8),
            bias: BiasVolume::sphere(0.9, 1.1)?,
        };
        McSystem::new(cfg, potential, 2)
    }

    fn distances(sys: &McSystem) -> Vec<f64> {
        vec![
            norm_sq(&sys.config.displacement(0, 1)).sqrt(),
            norm_sq(&sys.config.displacement(1, 2)).sqrt(),
            norm_sq(&sys.config.displacement(0, 2)).sqrt(),
        ]
    }

    #[test]
    fn rigid_moves_keep_the_trimer_intact() -> Result<()> {
        let mut sys = trimer_and_monomer()?;
        assert_eq!(sys.graph.num_edges(), 2);
        let before = distances(&sys);
        let mut moves: Vec<Box<dyn McMove>> = vec![
            Box::new(SmerTranslateMove::new(0.5)?),
            Box::new(SmerRotateMove::new(1.0)?),
        ];
        let mut rng = StdRng::seed_from_u64(21);
        for round in 0..40 {
            let mv = &mut moves[round % 2];
            mv.do_trial(&mut sys, &mut rng)?;
            assert_eq!(mv.energy_delta(&sys), 0.0, "{} trial", mv.name());
            let size = mv.affected_particles().len();
            assert!(size == 3 || size == 1);
            mv.accept_notify(&mut sys)?;
            sys.commit(mv.affected_particles())?;
            for (a, b) in before.iter().zip(distances(&sys)) {
                assert!((a - b).abs() < 1e-9, "{a} vs {b}");
            }
        }
        sys.validate()?;
        assert_eq!(sys.graph.num_edges(), 2);
        Ok(())
    }

    #[test]
    fn rejected_cluster_trial_restores_every_member() -> Result<()> {
        let mut sys = trimer_and_monomer()?;
        let start: Vec<_> = sys.config.particles.iter().map(|p| p.r).collect();
        let mut mv = SmerRotateMove::new(3.0)?;
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..10 {
            mv.do_trial(&mut sys, &mut rng)?;
            mv.reject_notify(&mut sys)?;
        }
        let end: Vec<_> = sys.config.particles.iter().map(|p| p.r).collect();
        assert_eq!(start, end);
        assert!(mv.reject_notify(&mut sys).is_err());
        Ok(())
    }

    #[test]
    fn trial_that_would_bond_outside_the_cluster_is_refused() -> Result<()> {
        let mut sys = trimer_and_monomer()?;
        // park the monomer just past the trimer's end so any shift toward it bonds
        sys.config.particles[3].r = [5.15, 5.0, 5.0];
        sys.commit(&[3])?;
        assert_eq!(sys.graph.degree(3), 0);
        let mut mv = SmerTranslateMove::new(0.3)?;
        let mut rng = StdRng::seed_from_u64(8);
        let mut refused = 0;
        for _ in 0..200 {
            mv.do_trial(&mut sys, &mut rng)?;
            if mv.energy_delta(&sys).is_infinite() {
                refused += 1;
            }
            mv.reject_notify(&mut sys)?;
        }
        assert!(refused > 0);
        sys.validate()?;
        Ok(())
    }
}
