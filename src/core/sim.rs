use crate::bonding::{BondTable, BumpOutcome, CollisionKind, InteractionTable, Shell};
use crate::config::EdmdConfig;
use crate::core::particle::DIM;
use crate::core::vec3::norm_sq;
use crate::core::{Event, EventKind, Particle};
use crate::error::{Error, Result};
use rand::{rng, rngs::StdRng, Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{debug, info, instrument, trace};

/// Small numeric tolerance for time and geometric checks.
const EPS_TIME: f64 = 1e-12;

/// Slack allowed by `check_invariants` on well and core distances.
const GEOM_TOL: f64 = 1e-6;

/// Processed events by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub core_bounces: u64,
    pub captures: u64,
    pub escapes: u64,
    pub inner_bounces: u64,
    pub well_repulsions: u64,
    pub wall_hits: u64,
}

impl EventCounts {
    fn record(&mut self, kind: CollisionKind) {
        match kind {
            CollisionKind::CoreBounce => self.core_bounces += 1,
            CollisionKind::Capture => self.captures += 1,
            CollisionKind::Escape => self.escapes += 1,
            CollisionKind::InnerWallBounce => self.inner_bounces += 1,
            CollisionKind::WellRepulsion => self.well_repulsions += 1,
        }
    }
}

/// Event-driven square-well fluid with reversible bonds in a static box with specular walls.
///
/// Walls are implicitly represented by six planes:
/// - For axis k in {0,1,2}, wall_id = 2*k (min wall at x_k = 0), wall_id = 2*k+1 (max wall at x_k = L_k).
///
/// A particle's wall contact radius is half the core diameter of its own species pair.
#[derive(Debug)]
pub struct Simulation {
    time_now: f64,
    box_size: [f64; DIM],
    pub particles: Vec<Particle>,
    table: InteractionTable,
    bonds: BondTable,
    pq: BinaryHeap<Reverse<Event>>,
    potential: f64,
    virial_sum: f64,
    wall_impulse: f64,
    counts: EventCounts,
}

impl Simulation {
    /// Build a random system from a configuration.
    ///
    /// Particles are placed with rejection sampling so that no two cores overlap, species
    /// in the order listed. Velocity components are uniform in `[-max_speed, max_speed]`.
    pub fn new(cfg: &EdmdConfig) -> Result<Self> {
        cfg.validate()?;
        let table = cfg.interaction_table()?;
        let box_size = cfg.box_size;

        let mut rng: StdRng = match cfg.seed {
            Some(s) => SeedableRng::seed_from_u64(s),
            None => SeedableRng::seed_from_u64(rng().random()),
        };

        let mut particles: Vec<Particle> = Vec::with_capacity(cfg.num_particles());
        let max_attempts = 1_000_000usize;
        let mut id = 0u32;
        for (species, sc) in cfg.species.iter().enumerate() {
            let species = species as u32;
            let radius = table.get(species, species)?.core_diameter() / 2.0;
            if box_size.iter().any(|&l| l < 2.0 * radius) {
                return Err(Error::InvalidParam(
                    "box_size must be at least one core diameter in every dimension".into(),
                ));
            }
            for _ in 0..sc.count {
                let mut attempts = 0usize;
                let r = loop {
                    if attempts >= max_attempts {
                        return Err(Error::SamplingFailed {
                            what: "non-overlapping initial position",
                            attempts,
                        });
                    }
                    attempts += 1;
                    let mut r = [0.0_f64; DIM];
                    for (k, r_k) in r.iter_mut().enumerate() {
                        *r_k = rng.random_range(radius..=box_size[k] - radius);
                    }
                    if !overlaps_existing(&particles, &table, species, &r)? {
                        break r;
                    }
                };

                let mut v = [0.0_f64; DIM];
                v.iter_mut()
                    .for_each(|x| *x = rng.random_range(-cfg.max_speed..=cfg.max_speed));

                particles.push(
                    Particle::new(id, r, v, sc.mass)?
                        .with_species(species)
                        .with_radius(radius)?,
                );
                id += 1;
            }
        }

        Self::from_particles(particles, table, box_size)
    }

    /// Wrap explicit particles. Ids must equal indices, positions must lie inside the walls
    /// and every species pair must have a kernel. Bonds are formed greedily for pairs that
    /// start inside their well.
    pub fn from_particles(
        particles: Vec<Particle>,
        table: InteractionTable,
        box_size: [f64; DIM],
    ) -> Result<Self> {
        if particles.is_empty() {
            return Err(Error::InvalidParam("at least one particle is required".into()));
        }
        if !box_size.iter().all(|&l| l.is_finite() && l > 0.0) {
            return Err(Error::InvalidParam(
                "box_size components must be finite and > 0".into(),
            ));
        }
        table.validate()?;
        for (idx, p) in particles.iter().enumerate() {
            if p.id as usize != idx {
                return Err(Error::InvalidParam(format!(
                    "particle at index {idx} has id {}",
                    p.id
                )));
            }
            if p.species as usize >= table.n_species() {
                return Err(Error::InvalidParam(format!(
                    "particle {idx} has unknown species {}",
                    p.species
                )));
            }
            for k in 0..DIM {
                if p.r[k] < p.radius - GEOM_TOL || p.r[k] > box_size[k] - p.radius + GEOM_TOL {
                    return Err(Error::InvalidParam(format!(
                        "particle {idx} lies outside the box"
                    )));
                }
            }
        }

        let n = particles.len();
        let mut sim = Self {
            time_now: 0.0,
            box_size,
            particles,
            table,
            bonds: BondTable::new(n),
            pq: BinaryHeap::new(),
            potential: 0.0,
            virial_sum: 0.0,
            wall_impulse: 0.0,
            counts: EventCounts::default(),
        };
        sim.rebuild_event_queue()?;
        info!(
            particles = n,
            bonds = sim.bonds.num_bonds(),
            "square-well simulation ready"
        );
        Ok(sim)
    }

    /// Returns current simulation time.
    pub fn time(&self) -> f64 {
        self.time_now
    }

    /// Number of particles.
    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn box_size(&self) -> [f64; DIM] {
        self.box_size
    }

    pub fn bonds(&self) -> &BondTable {
        &self.bonds
    }

    pub fn interactions(&self) -> &InteractionTable {
        &self.table
    }

    pub fn event_counts(&self) -> EventCounts {
        self.counts
    }

    /// Positions as a Vec of fixed-size arrays.
    pub fn positions(&self) -> Vec<[f64; DIM]> {
        self.particles.iter().map(|p| p.r).collect()
    }

    /// Velocities as a Vec of fixed-size arrays.
    pub fn velocities(&self) -> Vec<[f64; DIM]> {
        self.particles.iter().map(|p| p.v).collect()
    }

    /// Advance the simulation to `target_time` (must be ≥ current time).
    ///
    /// All particles are drifted to each processed event time; stale queue entries are
    /// discarded by comparing collision-count snapshots.
    #[instrument(level = "debug", skip(self))]
    pub fn advance_to(&mut self, target_time: f64) -> Result<()> {
        if !target_time.is_finite() {
            return Err(Error::InvalidParam("target_time must be finite".into()));
        }
        if target_time < self.time_now - EPS_TIME {
            return Err(Error::InvalidParam(
                "target_time cannot be earlier than current time".into(),
            ));
        }

        while self.time_now + EPS_TIME < target_time {
            let Some(Reverse(ev)) = self.pq.pop() else {
                self.drift_all(target_time)?;
                self.time_now = target_time;
                break;
            };

            let t_ev = ev.time_f64();

            if t_ev > target_time {
                self.drift_all(target_time)?;
                self.time_now = target_time;
                self.pq.push(Reverse(ev));
                break;
            }

            match ev.kind {
                EventKind::Pair { i, j, shell } => {
                    let (ii, jj) = (i as usize, j as usize);
                    let (cci, ccj) = (
                        self.particles[ii].collision_count,
                        self.particles[jj].collision_count,
                    );
                    if !ev.is_valid(cci, Some(ccj)) {
                        continue;
                    }

                    self.drift_all(t_ev)?;
                    self.time_now = t_ev;
                    trace!(t = t_ev, i = ii, j = jj, ?shell, "pair event");
                    let outcome = self.resolve_pair(ii, jj, shell)?;

                    self.particles[ii].bump_collision_count();
                    self.particles[jj].bump_collision_count();

                    self.reschedule_for_particle(ii)?;
                    self.reschedule_for_particle(jj)?;

                    if outcome.kind.changes_bonds() {
                        debug!(
                            t = t_ev,
                            i = ii,
                            j = jj,
                            kind = ?outcome.kind,
                            bonds = self.bonds.num_bonds(),
                            "bond state changed"
                        );
                    }
                }
                EventKind::Wall { i, wall_id } => {
                    let ii = i as usize;
                    let cci = self.particles[ii].collision_count;
                    if !ev.is_valid(cci, None) {
                        continue;
                    }

                    self.drift_all(t_ev)?;
                    self.time_now = t_ev;
                    self.resolve_wall(ii, wall_id)?;

                    self.particles[ii].bump_collision_count();

                    self.reschedule_for_particle(ii)?;
                }
            }
        }

        Ok(())
    }

    /// Compute total kinetic energy (diagnostic).
    pub fn kinetic_energy(&self) -> f64 {
        self.particles.iter().map(|p| p.kinetic_energy()).sum()
    }

    /// Sum of `-epsilon` over current bonds.
    pub fn potential_energy(&self) -> f64 {
        self.potential
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy() + self.potential
    }

    pub fn momentum(&self) -> [f64; DIM] {
        let mut p = [0.0; DIM];
        for q in &self.particles {
            for (k, p_k) in p.iter_mut().enumerate() {
                *p_k += q.mass * q.v[k];
            }
        }
        p
    }

    /// Accumulated pair-collision virial since the last queue rebuild.
    pub fn virial_sum(&self) -> f64 {
        self.virial_sum
    }

    /// Time-averaged pressure from the impulse delivered to all six walls.
    pub fn wall_pressure(&self) -> Result<f64> {
        if self.time_now <= EPS_TIME {
            return Err(Error::InvalidParam(
                "wall pressure needs a positive elapsed time".into(),
            ));
        }
        let [lx, ly, lz] = self.box_size;
        let area = 2.0 * (lx * ly + ly * lz + lx * lz);
        Ok(self.wall_impulse / (area * self.time_now))
    }

    /// Rebuild bonds and the event queue from the current particle states and box.
    ///
    /// This should be called after externally modifying positions/velocities. Bonds are
    /// re-derived from geometry, so the potential energy may jump.
    pub fn rebuild_event_queue(&mut self) -> Result<()> {
        let table = &self.table;
        let particles = &self.particles;
        let mut err = None;
        self.bonds.initialize(|i, j| {
            let (pi, pj) = (&particles[i], &particles[j]);
            match table.get(pi.species, pj.species) {
                Ok(w) => {
                    let d = [pj.r[0] - pi.r[0], pj.r[1] - pi.r[1], pj.r[2] - pi.r[2]];
                    norm_sq(&d) < w.well_diameter() * w.well_diameter()
                }
                Err(e) => {
                    err.get_or_insert(e);
                    false
                }
            }
        })?;
        if let Some(e) = err {
            return Err(e);
        }
        self.potential = self.bond_energy()?;
        self.virial_sum = 0.0;
        self.pq.clear();
        self.schedule_initial_events()
    }

    /// Check bond symmetry plus the geometric invariants of the current state.
    pub fn check_invariants(&self) -> Result<()> {
        self.bonds.validate()?;
        let n = self.particles.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (pi, pj) = (&self.particles[i], &self.particles[j]);
                let w = self.table.get(pi.species, pj.species)?;
                let r = norm_sq(&separation(pi, pj)).sqrt();
                if r < w.core_diameter() - GEOM_TOL {
                    return Err(Error::InvariantViolation(format!(
                        "cores of {i} and {j} overlap (r = {r})"
                    )));
                }
                if self.bonds.partner(i) == Some(j) && r > w.well_diameter() + GEOM_TOL {
                    return Err(Error::InvariantViolation(format!(
                        "bonded pair {i}-{j} outside its well (r = {r})"
                    )));
                }
            }
        }
        let expected = self.bond_energy()?;
        if (expected - self.potential).abs() > 1e-9 * (1.0 + expected.abs()) {
            return Err(Error::InvariantViolation(format!(
                "tracked potential {} differs from bond sum {expected}",
                self.potential
            )));
        }
        Ok(())
    }

    // ============ Internal helpers ============

    fn bond_energy(&self) -> Result<f64> {
        let mut u = 0.0;
        for (i, j) in self.bonds.pairs() {
            u -= self
                .table
                .get(self.particles[i].species, self.particles[j].species)?
                .epsilon();
        }
        Ok(u)
    }

    fn schedule_initial_events(&mut self) -> Result<()> {
        let n = self.particles.len();
        for i in 0..n {
            for j in (i + 1)..n {
                self.schedule_pair(i, j)?;
            }
        }
        for i in 0..n {
            self.schedule_wall(i)?;
        }
        Ok(())
    }

    fn reschedule_for_particle(&mut self, i: usize) -> Result<()> {
        self.schedule_wall(i)?;
        for j in 0..self.particles.len() {
            if j == i {
                continue;
            }
            let (a, b) = if i < j { (i, j) } else { (j, i) };
            self.schedule_pair(a, b)?;
        }
        Ok(())
    }

    fn schedule_pair(&mut self, i: usize, j: usize) -> Result<()> {
        if let Some((t, shell)) = self.predict_pair(i, j)? {
            let ev = Event::new(
                t,
                EventKind::Pair {
                    i: self.particles[i].id,
                    j: self.particles[j].id,
                    shell,
                },
                self.particles[i].collision_count,
                Some(self.particles[j].collision_count),
            )?;
            self.pq.push(Reverse(ev));
        }
        Ok(())
    }

    fn schedule_wall(&mut self, i: usize) -> Result<()> {
        if let Some((t, wall_id)) = self.predict_wall_time(i) {
            let ev = Event::new(
                t,
                EventKind::Wall {
                    i: self.particles[i].id,
                    wall_id,
                },
                self.particles[i].collision_count,
                None,
            )?;
            self.pq.push(Reverse(ev));
        }
        Ok(())
    }

    /// Absolute time and shell of the next crossing for pair (i, j), if any.
    fn predict_pair(&self, i: usize, j: usize) -> Result<Option<(f64, Shell)>> {
        let (pi, pj) = (&self.particles[i], &self.particles[j]);
        let state = self.bonds.pair_state(i, j)?;
        let well = self.table.get(pi.species, pj.species)?;
        let dr = separation(pi, pj);
        let mut dv = [0.0_f64; DIM];
        for (k, dv_k) in dv.iter_mut().enumerate() {
            *dv_k = pj.v[k] - pi.v[k];
        }
        Ok(well
            .predict(&dr, &dv, state, 0.0)
            .map(|p| (self.time_now + p.time, p.shell))
            .filter(|(t, _)| t.is_finite()))
    }

    /// Predict the earliest absolute particle-wall collision time for particle i.
    /// Returns (t_abs, wall_id).
    fn predict_wall_time(&self, i: usize) -> Option<(f64, u32)> {
        let p = &self.particles[i];
        let mut best_t = f64::INFINITY;
        let mut best_wall: Option<u32> = None;

        for (k, ((&x, &v), &l)) in p.r.iter().zip(&p.v).zip(&self.box_size).enumerate() {
            if v < -EPS_TIME {
                let t_rel = (p.radius - x) / v;
                if t_rel > EPS_TIME {
                    let t_abs = self.time_now + t_rel;
                    if t_abs < best_t {
                        best_t = t_abs;
                        best_wall = Some((2 * k) as u32);
                    }
                }
            }
            if v > EPS_TIME {
                let t_rel = (l - p.radius - x) / v;
                if t_rel > EPS_TIME {
                    let t_abs = self.time_now + t_rel;
                    if t_abs < best_t {
                        best_t = t_abs;
                        best_wall = Some((2 * k + 1) as u32);
                    }
                }
            }
        }

        best_wall.map(|w| (best_t, w))
    }

    /// Drift all particles to the specified absolute time by linear motion.
    fn drift_all(&mut self, to_time: f64) -> Result<()> {
        if to_time < self.time_now - EPS_TIME {
            return Err(Error::InvalidParam("cannot drift backwards in time".into()));
        }
        let dt = to_time - self.time_now;
        if dt.abs() <= EPS_TIME {
            return Ok(());
        }
        for p in &mut self.particles {
            for k in 0..DIM {
                let lo = p.radius;
                let hi = self.box_size[k] - p.radius;
                p.r[k] += p.v[k] * dt;
                // Clamp round-off; real wall contacts arrive as Wall events.
                p.r[k] = p.r[k].clamp(lo, hi);
            }
        }
        Ok(())
    }

    fn resolve_pair(&mut self, i: usize, j: usize, shell: Shell) -> Result<BumpOutcome> {
        let well = *self
            .table
            .get(self.particles[i].species, self.particles[j].species)?;
        let outcome = well.bump(&mut self.particles, i, j, &mut self.bonds, shell, 0.0)?;
        self.potential += outcome.delta_potential;
        self.virial_sum += outcome.virial;
        self.counts.record(outcome.kind);
        Ok(outcome)
    }

    /// Resolve a particle-wall collision by specular reflection on the hit axis.
    fn resolve_wall(&mut self, i: usize, wall_id: u32) -> Result<()> {
        let (axis, is_max) = wall_axis_side(wall_id)?;
        let p = &mut self.particles[i];
        self.wall_impulse += 2.0 * p.mass * p.v[axis].abs();
        p.v[axis] = -p.v[axis];

        // Snap position to the exact contact plane
        p.r[axis] = if is_max {
            self.box_size[axis] - p.radius
        } else {
            p.radius
        };
        self.counts.wall_hits += 1;
        Ok(())
    }
}

// ============ Utility helpers ============

#[inline]
fn separation(pi: &Particle, pj: &Particle) -> [f64; DIM] {
    let mut d = [0.0_f64; DIM];
    for (k, d_k) in d.iter_mut().enumerate() {
        *d_k = pj.r[k] - pi.r[k];
    }
    d
}

#[inline]
fn wall_axis_side(wall_id: u32) -> Result<(usize, bool)> {
    let axis = (wall_id / 2) as usize;
    if axis >= DIM {
        return Err(Error::InvalidParam(format!("wall_id {wall_id} out of range")));
    }
    Ok((axis, wall_id % 2 == 1))
}

fn overlaps_existing(
    existing: &[Particle],
    table: &InteractionTable,
    species: u32,
    r: &[f64; DIM],
) -> Result<bool> {
    for p in existing {
        let core = table.get(species, p.species)?.core_diameter();
        let mut d = [0.0_f64; DIM];
        for ((dk, &rk), &pk) in d.iter_mut().zip(r.iter()).zip(p.r.iter()) {
            *dk = rk - pk;
        }
        if norm_sq(&d) < core * core {
            return Ok(true);
        }
    }
    Ok(false)
}
