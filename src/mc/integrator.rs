//! Metropolis driver over a weighted set of trial moves.

use crate::config::McConfig;
use crate::error::{Error, Result};
use crate::mc::{
    BiasedBondMove, DisplaceMove, McMove, McSystem, RotateMove, SmerRotateMove, SmerTranslateMove,
};
use rand::rngs::StdRng;
use rand::{rng, Rng, SeedableRng};
use tracing::{debug, info, instrument};

/// Attempt and acceptance counts of one move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveStats {
    pub attempted: u64,
    pub accepted: u64,
}

impl MoveStats {
    pub fn acceptance_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }
}

struct Slot {
    mv: Box<dyn McMove>,
    weight: f64,
    stats: MoveStats,
}

/// Monte Carlo integrator: picks a move by weight, applies the Metropolis test
/// `min(1, a exp(-dU / kT))` and commits accepted moves to the association graph.
pub struct MonteCarlo {
    pub system: McSystem,
    temperature: f64,
    moves: Vec<Slot>,
    total_weight: f64,
    rng: StdRng,
    steps: u64,
}

impl MonteCarlo {
    pub fn new(system: McSystem, temperature: f64, seed: Option<u64>) -> Result<Self> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(Error::InvalidParam("temperature must be finite and > 0".into()));
        }
        let rng: StdRng = match seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };
        Ok(Self {
            system,
            temperature,
            moves: Vec::new(),
            total_weight: 0.0,
            rng,
            steps: 0,
        })
    }

    /// Random system plus the moves named in the configuration.
    pub fn from_config(cfg: &McConfig) -> Result<Self> {
        cfg.validate()?;
        let mut rng: StdRng = match cfg.seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };
        let system = McSystem::from_config(cfg, &mut rng)?;
        let mut mc = Self::new(system, cfg.temperature, Some(rng.random()))?;
        let w = cfg.moves;
        if w.biased_bond > 0.0 {
            mc.add_move(Box::new(BiasedBondMove::new()), w.biased_bond)?;
        }
        if w.displace > 0.0 {
            mc.add_move(Box::new(DisplaceMove::new(cfg.displace_step)?), w.displace)?;
        }
        if w.rotate > 0.0 {
            mc.add_move(Box::new(RotateMove::new(cfg.rotate_step)?), w.rotate)?;
        }
        if w.smer_translate > 0.0 {
            mc.add_move(
                Box::new(SmerTranslateMove::new(cfg.displace_step)?),
                w.smer_translate,
            )?;
        }
        if w.smer_rotate > 0.0 {
            mc.add_move(Box::new(SmerRotateMove::new(cfg.rotate_step)?), w.smer_rotate)?;
        }
        Ok(mc)
    }

    pub fn add_move(&mut self, mv: Box<dyn McMove>, weight: f64) -> Result<()> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(Error::InvalidParam(format!(
                "weight of move {} must be > 0",
                mv.name()
            )));
        }
        self.total_weight += weight;
        self.moves.push(Slot {
            mv,
            weight,
            stats: MoveStats::default(),
        });
        Ok(())
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Per-move statistics in insertion order.
    pub fn stats(&self) -> Vec<(&'static str, MoveStats)> {
        self.moves.iter().map(|s| (s.mv.name(), s.stats)).collect()
    }

    /// One trial of one move. Returns whether it was accepted.
    pub fn step(&mut self) -> Result<bool> {
        if self.moves.is_empty() {
            return Err(Error::InvalidParam("no moves registered".into()));
        }
        let k = self.select_move();
        self.steps += 1;
        let slot = &mut self.moves[k];
        slot.stats.attempted += 1;

        if !slot.mv.do_trial(&mut self.system, &mut self.rng)? {
            return Ok(false);
        }

        let du = slot.mv.energy_delta(&self.system);
        let bias = slot.mv.acceptance_bias(&self.system);
        let p = if du.is_infinite() && du > 0.0 {
            0.0
        } else {
            bias * (-du / self.temperature).exp()
        };
        let accepted = p >= 1.0 || (p > 0.0 && self.rng.random::<f64>() < p);

        if accepted {
            slot.mv.accept_notify(&mut self.system)?;
            self.system.commit(slot.mv.affected_particles())?;
            slot.stats.accepted += 1;
        } else {
            slot.mv.reject_notify(&mut self.system)?;
        }
        Ok(accepted)
    }

    /// Run `n` trials, invoking `observe` after each one.
    #[instrument(level = "debug", skip(self, observe))]
    pub fn run_with<F>(&mut self, n: u64, mut observe: F) -> Result<()>
    where
        F: FnMut(&McSystem),
    {
        for _ in 0..n {
            self.step()?;
            observe(&self.system);
        }
        for s in &self.moves {
            debug!(
                name = s.mv.name(),
                attempted = s.stats.attempted,
                rate = s.stats.acceptance_rate(),
                "move summary"
            );
        }
        Ok(())
    }

    pub fn run(&mut self, n: u64) -> Result<()> {
        info!(trials = n, associated = self.system.graph.num_associated(), "mc run");
        self.run_with(n, |_| {})
    }

    fn select_move(&mut self) -> usize {
        if self.moves.len() == 1 {
            return 0;
        }
        let mut x = self.rng.random_range(0.0..self.total_weight);
        for (k, s) in self.moves.iter().enumerate() {
            if x < s.weight {
                return k;
            }
            x -= s.weight;
        }
        self.moves.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_keeps_graph_consistent() -> Result<()> {
        let cfg = McConfig::from_toml_str(
            r#"
box_size = [6.0, 6.0, 6.0]
num_particles = 30
seed = 17
epsilon = 2.0
core = 0.8
max_degree = 2

[bias]
shape = "sphere"
inner = 0.8
outer = 1.2

[moves]
biased_bond = 1.0
displace = 1.0
"#,
        )?;
        let mut mc = MonteCarlo::from_config(&cfg)?;
        mc.run(3000)?;
        mc.system.validate()?;
        let stats = mc.stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats.iter().map(|(_, s)| s.attempted).sum::<u64>(), 3000);
        assert!(stats.iter().all(|(_, s)| s.accepted > 0));
        assert!(mc.system.graph.num_edges() > 0);
        Ok(())
    }

    #[test]
    fn empty_driver_errors() -> Result<()> {
        let cfg = McConfig::from_toml_str(
            r#"
box_size = [6.0, 6.0, 6.0]
num_particles = 4
epsilon = 1.0

[bias]
shape = "cube"
half_width = 0.5
"#,
        )?;
        let mut rng = StdRng::seed_from_u64(1);
        let sys = McSystem::from_config(&cfg, &mut rng)?;
        let mut mc = MonteCarlo::new(sys, 1.0, Some(2))?;
        assert!(mc.step().is_err());
        Ok(())
    }
}
