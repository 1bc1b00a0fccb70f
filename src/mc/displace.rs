//! Plain single-particle moves: translation and orientation rotation.

use crate::core::vec3::{normalized, random_unit, rotate};
use crate::error::{Error, Result};
use crate::mc::{pick, McMove, McSystem, Snapshot};
use rand::rngs::StdRng;
use rand::Rng;

/// Shared bookkeeping of a symmetric single-particle trial.
#[derive(Debug, Clone, Default)]
struct SingleTrial {
    snapshot: Option<Snapshot>,
    u_old: f64,
    u_new: f64,
    affected: Vec<usize>,
    scratch: Vec<usize>,
}

impl SingleTrial {
    fn begin(&mut self, sys: &McSystem, i: usize) {
        self.affected.clear();
        self.affected.push(i);
        self.snapshot = Some(Snapshot::take(&sys.config, i));
        self.u_old = sys.committed_energy(i);
    }

    fn finish(&mut self, sys: &McSystem, i: usize) {
        self.u_new = sys.trial_energy(i, &mut self.scratch);
    }

    fn reject(&mut self, sys: &mut McSystem) -> Result<()> {
        let snap = self.snapshot.take().ok_or_else(|| {
            Error::InvariantViolation("reject_notify without a pending trial".into())
        })?;
        snap.restore(&mut sys.config);
        Ok(())
    }
}

/// Uniform displacement in `[-step, step]` per axis.
#[derive(Debug, Clone)]
pub struct DisplaceMove {
    step: f64,
    trial: SingleTrial,
}

impl DisplaceMove {
    pub fn new(step: f64) -> Result<Self> {
        if !step.is_finite() || step <= 0.0 {
            return Err(Error::InvalidParam("displacement step must be > 0".into()));
        }
        Ok(Self {
            step,
            trial: SingleTrial::default(),
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }
}

impl McMove for DisplaceMove {
    fn name(&self) -> &'static str {
        "displace"
    }

    fn do_trial(&mut self, sys: &mut McSystem, rng: &mut StdRng) -> Result<bool> {
        let i = pick(rng, sys.len());
        self.trial.begin(sys, i);
        let mut r = sys.config.particles[i].r;
        for x in &mut r {
            *x += rng.random_range(-self.step..=self.step);
        }
        sys.config.boundary.wrap(&mut r);
        sys.config.particles[i].r = r;
        self.trial.finish(sys, i);
        Ok(true)
    }

    fn acceptance_bias(&self, _sys: &McSystem) -> f64 {
        1.0
    }

    fn energy_delta(&self, _sys: &McSystem) -> f64 {
        self.trial.u_new - self.trial.u_old
    }

    fn accept_notify(&mut self, _sys: &mut McSystem) -> Result<()> {
        self.trial.snapshot = None;
        Ok(())
    }

    fn reject_notify(&mut self, sys: &mut McSystem) -> Result<()> {
        self.trial.reject(sys)
    }

    fn affected_particles(&self) -> &[usize] {
        &self.trial.affected
    }
}

/// Rotation of one orientation about a random axis by an angle in `[-max_angle, max_angle]`.
#[derive(Debug, Clone)]
pub struct RotateMove {
    max_angle: f64,
    trial: SingleTrial,
}

impl RotateMove {
    pub fn new(max_angle: f64) -> Result<Self> {
        if !max_angle.is_finite() || max_angle <= 0.0 {
            return Err(Error::InvalidParam("rotation step must be > 0".into()));
        }
        Ok(Self {
            max_angle,
            trial: SingleTrial::default(),
        })
    }
}

impl McMove for RotateMove {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn do_trial(&mut self, sys: &mut McSystem, rng: &mut StdRng) -> Result<bool> {
        let i = pick(rng, sys.len());
        let Some(e) = sys.config.particles[i].orientation else {
            return Err(Error::InvalidParam(format!(
                "rotate move on particle {i} without orientation"
            )));
        };
        self.trial.begin(sys, i);
        let axis = random_unit(rng);
        let angle = rng.random_range(-self.max_angle..=self.max_angle);
        let e_new = normalized(&rotate(&e, &axis, angle)).unwrap_or(e);
        sys.config.particles[i].orientation = Some(e_new);
        self.trial.finish(sys, i);
        Ok(true)
    }

    fn acceptance_bias(&self, _sys: &McSystem) -> f64 {
        1.0
    }

    fn energy_delta(&self, _sys: &McSystem) -> f64 {
        self.trial.u_new - self.trial.u_old
    }

    fn accept_notify(&mut self, _sys: &mut McSystem) -> Result<()> {
        self.trial.snapshot = None;
        Ok(())
    }

    fn reject_notify(&mut self, sys: &mut McSystem) -> Result<()> {
        self.trial.reject(sys)
    }

    fn affected_particles(&self) -> &[usize] {
        &self.trial.affected
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

    fn oriented_pair() -> Result<McSystem> {
        let ps = vec![
            Particle::new(0, [2.0, 2.0, 2.0], [0.0; 3], 1.0)?.with_orientation([1.0, 0.0, 0.0])?,
            Particle::new(1, [3.0, 2.0, 2.0], [0.0; 3], 1.0)?.with_orientation([-1.0, 0.0, 0.0])?,
        ];
        let cfg = Configuration::new(ps, PeriodicBox::cubic(6.0)?)?;
        let potential = AssociationPotential {
            epsilon: 2.0,
            core: Some(0.5),
            bias: BiasVolume::oriented_sphere(0.8, 1.1, 0.5)?,
        };
        McSystem::new(cfg, potential, 1)
    }

    #[test]
    fn rotation_keeps_unit_length_and_restores() -> Result<()> {
        let mut sys = oriented_pair()?;
        assert_eq!(sys.graph.num_edges(), 1);
        let mut mv = RotateMove::new(3.0)?;
        let mut rng = StdRng::seed_from_u64(9);
        mv.do_trial(&mut sys, &mut rng)?;
        let i = mv.affected_particles()[0];
        let e = sys.config.particles[i].orientation.expect("oriented");
        assert!((norm_sq(&e) - 1.0).abs() < 1e-12);
        mv.reject_notify(&mut sys)?;
        sys.validate()?;
        Ok(())
    }

    #[test]
    fn displacement_energy_tracks_association() -> Result<()> {
        let mut sys = oriented_pair()?;
        let mut mv = DisplaceMove::new(2.5)?;
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            mv.do_trial(&mut sys, &mut rng)?;
            let du = mv.energy_delta(&sys);
            // either the bond survives, breaks (+2), or the cores overlap
            assert!(du == 0.0 || du == 2.0 || du.is_infinite(), "du = {du}");
            mv.reject_notify(&mut sys)?;
        }
        sys.validate()?;
        Ok(())
    }
}
