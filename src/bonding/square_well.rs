//! Bonded square-well collision kernel.
//!
//! The pair potential is infinite inside the core diameter, `-epsilon` between core and
//! well diameter, and zero outside. At most one bond per particle is allowed: a particle
//! that is bonded elsewhere presents a hard sphere of the well diameter to everyone else.

use crate::bonding::bond_table::{BondTable, PairBonding};
use crate::core::particle::{Particle, DIM};
use crate::core::vec3::{dot, norm_sq, Vec3};
use crate::error::{Error, Result};
use tracing::debug;

/// Radial offset applied after capture, escape and inner-wall bounces so the same
/// crossing is not predicted again at time zero.
pub const NUDGE: f64 = 1e-10;

/// Relative speeds (squared) below this are treated as "never collide".
const V2_MIN: f64 = 1e-24;

/// The two collision shells of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shell {
    Core,
    Well,
}

/// Predicted event for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Time measured on the same clock as `false_time`.
    pub time: f64,
    pub shell: Shell,
}

/// What a resolved collision did to the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionKind {
    /// Elastic reflection at the core diameter.
    CoreBounce,
    /// Free pair entered the well and formed a bond.
    Capture,
    /// Bonded pair left the well and the bond broke.
    Escape,
    /// Bonded pair lacked the energy to escape and reflected off the well from inside.
    InnerWallBounce,
    /// Hard repulsion at the well diameter because one partner is bonded elsewhere.
    WellRepulsion,
}

impl CollisionKind {
    pub fn changes_bonds(self) -> bool {
        matches!(self, CollisionKind::Capture | CollisionKind::Escape)
    }
}

/// Result of `SquareWell::bump`, reported to the scheduler for energy and pressure accounting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BumpOutcome {
    pub kind: CollisionKind,
    /// Change in pair potential energy (`-epsilon` on capture, `+epsilon` on escape).
    pub delta_potential: f64,
    /// Change in kinetic energy, always `-delta_potential`.
    pub delta_kinetic: f64,
    /// Collision virial `mu * (b_before - b_after)` with `b = dr . dv`.
    pub virial: f64,
}

/// Bonded square-well interaction between one species pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareWell {
    core: f64,
    well: f64,
    epsilon: f64,
    core_sq: f64,
    well_sq: f64,
}

impl SquareWell {
    /// Errors if `core <= 0`, `well <= core`, or `epsilon` is negative/non-finite.
    pub fn new(core: f64, well: f64, epsilon: f64) -> Result<Self> {
        if !core.is_finite() || core <= 0.0 {
            return Err(Error::InvalidParam(
                "core diameter must be finite and > 0".into(),
            ));
        }
        if !well.is_finite() || well <= core {
            return Err(Error::InvalidParam(format!(
                "well diameter ({well}) must exceed core diameter ({core})"
            )));
        }
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(Error::InvalidParam(
                "well depth epsilon must be finite and >= 0".into(),
            ));
        }
        Ok(Self {
            core,
            well,
            epsilon,
            core_sq: core * core,
            well_sq: well * well,
        })
    }

    #[inline]
    pub fn core_diameter(&self) -> f64 {
        self.core
    }

    #[inline]
    pub fn well_diameter(&self) -> f64 {
        self.well
    }

    #[inline]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Shells that can produce an event for a pair in `state`.
    pub fn live_shells(state: PairBonding) -> &'static [Shell] {
        match state {
            PairBonding::Free | PairBonding::Mutual => &[Shell::Core, Shell::Well],
            PairBonding::Saturated => &[Shell::Well],
        }
    }

    /// Earliest admissible crossing of a live shell.
    ///
    /// `dr` and `dv` are `r_j - r_i` and `v_j - v_i` at the positions' reference time;
    /// they are advanced by `false_time` before solving `|dr + t dv|^2 = sigma^2`.
    /// Returns `None` when no root qualifies, including zero relative velocity.
    pub fn predict(&self, dr: &Vec3, dv: &Vec3, state: PairBonding, false_time: f64) -> Option<Prediction> {
        let mut d = *dr;
        for k in 0..DIM {
            d[k] += dv[k] * false_time;
        }
        let v2 = norm_sq(dv);
        if !(v2 > V2_MIN) {
            return None;
        }
        let r2 = norm_sq(&d);
        let bij = dot(&d, dv);

        let hit = match state {
            PairBonding::Mutual => {
                let core_hit = if bij < 0.0 {
                    approach_root(r2, bij, v2, self.core_sq).map(|t| (t, Shell::Core))
                } else {
                    None
                };
                core_hit.or_else(|| {
                    // Inside the well every trajectory eventually reaches the outer wall.
                    let disc = bij * bij - v2 * (r2 - self.well_sq);
                    if disc < 0.0 {
                        return None;
                    }
                    let t = (-bij + disc.sqrt()) / v2;
                    Some((t.max(0.0), Shell::Well))
                })
            }
            PairBonding::Saturated => {
                if bij >= 0.0 {
                    None
                } else if r2 >= self.well_sq {
                    approach_root(r2, bij, v2, self.well_sq).map(|t| (t, Shell::Well))
                } else {
                    approach_root(r2, bij, v2, self.core_sq).map(|t| (t, Shell::Core))
                }
            }
            PairBonding::Free => {
                if bij >= 0.0 {
                    None
                } else if r2 >= self.well_sq {
                    approach_root(r2, bij, v2, self.well_sq).map(|t| (t, Shell::Well))
                } else {
                    approach_root(r2, bij, v2, self.core_sq).map(|t| (t, Shell::Core))
                }
            }
        }?;

        let time = false_time + hit.0;
        time.is_finite().then_some(Prediction {
            time,
            shell: hit.1,
        })
    }

    /// `predict` reduced to a time, `+inf` when nothing happens.
    pub fn collision_time(&self, dr: &Vec3, dv: &Vec3, state: PairBonding, false_time: f64) -> f64 {
        self.predict(dr, dv, state, false_time)
            .map_or(f64::INFINITY, |p| p.time)
    }

    /// Resolve a collision of `i` and `j` on `shell`.
    ///
    /// Positions are taken to lag the collision by `false_time`; velocities are updated
    /// and positions corrected so that the state at `false_time` is consistent. The bond
    /// table changes by at most one bond. A one-sided bond is reported as an
    /// `InvariantViolation` and nothing is modified.
    pub fn bump(
        &self,
        particles: &mut [Particle],
        i: usize,
        j: usize,
        bonds: &mut BondTable,
        shell: Shell,
        false_time: f64,
    ) -> Result<BumpOutcome> {
        let state = bonds.pair_state(i, j)?;
        let (pi, pj) = pair_mut(particles, i, j)?;

        let mut dr = [0.0_f64; DIM];
        let mut dv = [0.0_f64; DIM];
        for k in 0..DIM {
            dv[k] = pj.v[k] - pi.v[k];
            dr[k] = pj.r[k] - pi.r[k] + dv[k] * false_time;
        }
        let r2 = norm_sq(&dr);
        if r2 <= f64::EPSILON {
            return Err(Error::MathError(format!(
                "degenerate line of centers in collision {i}-{j}"
            )));
        }
        let bij = dot(&dr, &dv);
        let (rm_i, rm_j) = (1.0 / pi.mass, 1.0 / pj.mass);
        let mu = 1.0 / (rm_i + rm_j);

        let (kind, bij_new, nudge) = match (shell, state) {
            (Shell::Core, _) => (CollisionKind::CoreBounce, -bij, 0.0),
            (Shell::Well, PairBonding::Saturated) => (CollisionKind::WellRepulsion, -bij, 0.0),
            (Shell::Well, PairBonding::Free) => {
                if bij >= 0.0 {
                    return Err(Error::MathError(format!(
                        "free pair {i}-{j} is not approaching at the well"
                    )));
                }
                bonds.form(i, j)?;
                debug!(i, j, "bond formed on capture");
                let b = -(bij * bij + 2.0 * self.epsilon * r2 / mu).sqrt();
                (CollisionKind::Capture, b, -NUDGE)
            }
            (Shell::Well, PairBonding::Mutual) => {
                if bij <= 0.0 {
                    return Err(Error::MathError(format!(
                        "bonded pair {i}-{j} is not separating at the well"
                    )));
                }
                let ke = 0.5 * mu * bij * bij / r2;
                if ke < self.epsilon {
                    (CollisionKind::InnerWallBounce, -bij, -NUDGE)
                } else {
                    bonds.break_bond(i, j)?;
                    debug!(i, j, "bond broken on escape");
                    let b = (bij * bij - 2.0 * self.epsilon * r2 / mu).max(0.0).sqrt();
                    (CollisionKind::Escape, b, NUDGE)
                }
            }
        };

        let virial = mu * (bij - bij_new);
        let factor = virial / r2;
        let r = r2.sqrt();
        let (frac_i, frac_j) = (rm_i * mu, rm_j * mu);
        for k in 0..DIM {
            let dvi = factor * dr[k] * rm_i;
            let dvj = -factor * dr[k] * rm_j;
            pi.v[k] += dvi;
            pj.v[k] += dvj;
            pi.r[k] -= dvi * false_time;
            pj.r[k] -= dvj * false_time;
            if nudge != 0.0 {
                let n_k = dr[k] / r;
                pi.r[k] -= nudge * frac_i * n_k;
                pj.r[k] += nudge * frac_j * n_k;
            }
        }

        let delta_kinetic = match kind {
            CollisionKind::Capture => self.epsilon,
            CollisionKind::Escape => -self.epsilon,
            _ => 0.0,
        };
        Ok(BumpOutcome {
            kind,
            delta_potential: -delta_kinetic,
            delta_kinetic,
            virial,
        })
    }
}

/// Earliest root of `|d + t v|^2 = target_sq` for an approaching pair outside the shell.
#[inline]
fn approach_root(r2: f64, bij: f64, v2: f64, target_sq: f64) -> Option<f64> {
    let disc = bij * bij - v2 * (r2 - target_sq);
    if disc <= 0.0 {
        return None;
    }
    let t = (-bij - disc.sqrt()) / v2;
    (t >= 0.0).then_some(t)
}

/// Disjoint mutable borrows of two particles.
pub(crate) fn pair_mut(
    particles: &mut [Particle],
    i: usize,
    j: usize,
) -> Result<(&mut Particle, &mut Particle)> {
    if i == j || i >= particles.len() || j >= particles.len() {
        return Err(Error::InvalidParam(format!(
            "invalid particle pair ({i}, {j}) for {} particles",
            particles.len()
        )));
    }
    if i < j {
        let (lo, hi) = particles.split_at_mut(j);
        Ok((&mut lo[i], &mut hi[0]))
    } else {
        let (lo, hi) = particles.split_at_mut(i);
        Ok((&mut hi[0], &mut lo[j]))
    }
}

/// Square-well kernels indexed by unordered species pair.
#[derive(Debug, Clone)]
pub struct InteractionTable {
    n_species: usize,
    entries: Vec<Option<SquareWell>>,
}

impl InteractionTable {
    pub fn new(n_species: usize) -> Self {
        Self {
            n_species,
            entries: vec![None; n_species * n_species],
        }
    }

    /// Table where every species pair uses `well`.
    pub fn uniform(n_species: usize, well: SquareWell) -> Self {
        Self {
            n_species,
            entries: vec![Some(well); n_species * n_species],
        }
    }

    #[inline]
    pub fn n_species(&self) -> usize {
        self.n_species
    }

    pub fn set(&mut self, a: u32, b: u32, well: SquareWell) -> Result<()> {
        let (a, b) = (a as usize, b as usize);
        if a >= self.n_species || b >= self.n_species {
            return Err(Error::InvalidParam(format!(
                "species pair ({a}, {b}) out of range for {} species",
                self.n_species
            )));
        }
        self.entries[a * self.n_species + b] = Some(well);
        self.entries[b * self.n_species + a] = Some(well);
        Ok(())
    }

    pub fn get(&self, a: u32, b: u32) -> Result<&SquareWell> {
        let (a, b) = (a as usize, b as usize);
        self.entries
            .get(a * self.n_species + b)
            .filter(|_| a < self.n_species && b < self.n_species)
            .and_then(|e| e.as_ref())
            .ok_or_else(|| Error::InvalidParam(format!("no interaction defined for species ({a}, {b})")))
    }

    /// Check that every species pair has a kernel.
    pub fn validate(&self) -> Result<()> {
        for a in 0..self.n_species as u32 {
            for b in a..self.n_species as u32 {
                self.get(a, b)?;
            }
        }
        Ok(())
    }

    pub fn max_well_diameter(&self) -> f64 {
        self.entries
            .iter()
            .flatten()
            .map(|w| w.well_diameter())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two(ri: Vec3, vi: Vec3, rj: Vec3, vj: Vec3) -> Result<Vec<Particle>> {
        Ok(vec![
            Particle::new(0, ri, vi, 1.0)?,
            Particle::new(1, rj, vj, 1.0)?,
        ])
    }

    fn momentum(ps: &[Particle]) -> Vec3 {
        let mut p = [0.0; DIM];
        for q in ps {
            for k in 0..DIM {
                p[k] += q.mass * q.v[k];
            }
        }
        p
    }

    #[test]
    fn construction_rejects_bad_diameters() {
        assert!(SquareWell::new(1.0, 1.0, 1.0).is_err());
        assert!(SquareWell::new(1.0, 0.5, 1.0).is_err());
        assert!(SquareWell::new(0.0, 1.0, 1.0).is_err());
        assert!(SquareWell::new(0.5, 1.0, -1.0).is_err());
    }

    #[test]
    fn zero_relative_velocity_never_collides() -> Result<()> {
        let sw = SquareWell::new(0.5, 1.0, 1.0)?;
        let t = sw.collision_time(&[1.0, 0.0, 0.0], &[0.0; DIM], PairBonding::Free, 0.0);
        assert!(t.is_infinite());
        Ok(())
    }

    #[test]
    fn saturated_pair_only_sees_the_well_shell() -> Result<()> {
        let sw = SquareWell::new(0.5, 1.0, 1.0)?;
        let p = sw
            .predict(&[2.0, 0.0, 0.0], &[-1.0, 0.0, 0.0], PairBonding::Saturated, 0.0)
            .expect("approaching pair collides");
        assert_eq!(p.shell, Shell::Well);
        assert!((p.time - 1.0).abs() < 1e-12);
        assert_eq!(SquareWell::live_shells(PairBonding::Saturated), &[Shell::Well]);
        Ok(())
    }

    #[test]
    fn bonded_pair_hits_core_then_escape_shell() -> Result<()> {
        let sw = SquareWell::new(0.5, 1.0, 1.0)?;
        let p = sw
            .predict(&[0.9, 0.0, 0.0], &[-1.0, 0.0, 0.0], PairBonding::Mutual, 0.0)
            .expect("core hit");
        assert_eq!(p.shell, Shell::Core);
        assert!((p.time - 0.4).abs() < 1e-12);
        let p = sw
            .predict(&[0.9, 0.0, 0.0], &[1.0, 0.0, 0.0], PairBonding::Mutual, 0.0)
            .expect("escape attempt");
        assert_eq!(p.shell, Shell::Well);
        assert!((p.time - 0.1).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn false_time_shifts_prediction() -> Result<()> {
        let sw = SquareWell::new(0.5, 1.0, 1.0)?;
        let t0 = sw.collision_time(&[3.0, 0.0, 0.0], &[-1.0, 0.0, 0.0], PairBonding::Free, 0.0);
        let t1 = sw.collision_time(&[3.0, 0.0, 0.0], &[-1.0, 0.0, 0.0], PairBonding::Free, 0.5);
        assert!((t0 - 2.0).abs() < 1e-12);
        assert!((t1 - 2.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn core_bounce_conserves_momentum_and_energy() -> Result<()> {
        let sw = SquareWell::new(0.5, 1.0, 1.0)?;
        let mut ps = two([0.0; DIM], [0.3, 0.1, 0.0], [0.4, 0.3, 0.0], [-0.5, 0.2, 0.1])?;
        ps[1].mass = 2.5;
        let mut bonds = BondTable::new(2);
        bonds.form(0, 1)?;
        let p0 = momentum(&ps);
        let ke0: f64 = ps.iter().map(Particle::kinetic_energy).sum();
        let out = sw.bump(&mut ps, 0, 1, &mut bonds, Shell::Core, 0.0)?;
        assert_eq!(out.kind, CollisionKind::CoreBounce);
        let p1 = momentum(&ps);
        let ke1: f64 = ps.iter().map(Particle::kinetic_energy).sum();
        for k in 0..DIM {
            assert!((p0[k] - p1[k]).abs() < 1e-12);
        }
        assert!((ke0 - ke1).abs() < 1e-12);
        assert_eq!(bonds.partner(0), Some(1));
        Ok(())
    }

    #[test]
    fn one_sided_bond_fails_without_mutation() -> Result<()> {
        let sw = SquareWell::new(0.5, 1.0, 1.0)?;
        let mut ps = two([0.0; DIM], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [-1.0, 0.0, 0.0])?;
        let mut bonds = BondTable::new(2);
        bonds.corrupt_one_side(0, 1);
        let v_before = ps[0].v;
        let err = sw.bump(&mut ps, 0, 1, &mut bonds, Shell::Well, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(ps[0].v, v_before);
        Ok(())
    }

    #[test]
    fn interaction_table_is_symmetric() -> Result<()> {
        let mut table = InteractionTable::new(2);
        table.set(0, 1, SquareWell::new(0.5, 1.2, 2.0)?)?;
        assert!(table.validate().is_err());
        table.set(0, 0, SquareWell::new(0.5, 1.0, 1.0)?)?;
        table.set(1, 1, SquareWell::new(0.5, 1.0, 1.0)?)?;
        table.validate()?;
        assert_eq!(table.get(1, 0)?.epsilon(), 2.0);
        assert!((table.max_well_diameter() - 1.2).abs() < 1e-12);
        assert!(table.get(2, 0).is_err());
        Ok(())
    }
}
