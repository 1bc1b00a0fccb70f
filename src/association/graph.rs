//! Incrementally maintained association graph for continuum Monte Carlo.

use crate::association::bias_volume::BiasVolume;
use crate::core::configuration::Configuration;
use crate::core::neighbors::NeighborSource;
use crate::error::{Error, Result};
use tracing::{debug, info};

/// Partners per particle plus the list of particles with at least one partner.
///
/// Only committed configurations reach the graph: it is rebuilt by `initialize` and
/// patched by `on_move_accepted`, never while a trial is under evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationGraph {
    partners: Vec<Vec<usize>>,
    associated: Vec<usize>,
    /// Position of each particle inside `associated`.
    slot: Vec<Option<usize>>,
    max_degree: usize,
}

impl AssociationGraph {
    pub fn new(n: usize, max_degree: usize) -> Result<Self> {
        if max_degree == 0 {
            return Err(Error::InvalidParam("max_degree must be >= 1".into()));
        }
        Ok(Self {
            partners: vec![Vec::new(); n],
            associated: Vec::new(),
            slot: vec![None; n],
            max_degree,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.partners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    #[inline]
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Partners of `p` in committed state.
    #[inline]
    pub fn associated_with(&self, p: usize) -> &[usize] {
        &self.partners[p]
    }

    /// Every particle with at least one partner, in insertion order.
    #[inline]
    pub fn associated(&self) -> &[usize] {
        &self.associated
    }

    #[inline]
    pub fn degree(&self, p: usize) -> usize {
        self.partners[p].len()
    }

    #[inline]
    pub fn num_associated(&self) -> usize {
        self.associated.len()
    }

    pub fn num_edges(&self) -> usize {
        self.partners.iter().map(Vec::len).sum::<usize>() / 2
    }

    #[inline]
    pub fn are_associated(&self, a: usize, b: usize) -> bool {
        self.partners[a].contains(&b)
    }

    /// Rebuild from scratch by testing every candidate pair once.
    pub fn initialize(
        &mut self,
        cfg: &Configuration,
        bias: &BiasVolume,
        neighbors: &dyn NeighborSource,
    ) -> Result<()> {
        self.check_size(cfg)?;
        self.partners.iter_mut().for_each(Vec::clear);
        self.associated.clear();
        self.slot.iter_mut().for_each(|s| *s = None);

        let mut cand = Vec::new();
        for i in 0..cfg.len() {
            neighbors.candidates(cfg, i, bias.range(), &mut cand);
            cand.sort_unstable();
            for &j in cand.iter().filter(|&&j| j > i) {
                if bias.is_associated(cfg, i, j) {
                    self.link(i, j);
                }
            }
        }
        self.check_degrees()?;
        info!(
            particles = cfg.len(),
            edges = self.num_edges(),
            associated = self.num_associated(),
            "association graph initialized"
        );
        Ok(())
    }

    /// Re-test each moved particle against its current neighbors and patch the edges.
    ///
    /// Must only be called for accepted moves; rejected trials never reach the graph.
    pub fn on_move_accepted(
        &mut self,
        moved: &[usize],
        cfg: &Configuration,
        bias: &BiasVolume,
        neighbors: &dyn NeighborSource,
    ) -> Result<()> {
        self.check_size(cfg)?;
        let mut fresh = Vec::new();
        for &p in moved {
            self.scan(p, cfg, bias, neighbors, &mut fresh);
            let stale: Vec<usize> = self.partners[p]
                .iter()
                .copied()
                .filter(|q| !fresh.contains(q))
                .collect();
            for q in stale {
                self.unlink(p, q);
            }
            for &q in &fresh {
                if !self.partners[p].contains(&q) {
                    self.link(p, q);
                }
            }
        }
        for &p in moved {
            self.check_degree_around(p)?;
        }
        debug!(moved = moved.len(), associated = self.num_associated(), "graph updated");
        Ok(())
    }

    /// Partners `p` would have in the current (possibly trial) configuration.
    pub fn scan(
        &self,
        p: usize,
        cfg: &Configuration,
        bias: &BiasVolume,
        neighbors: &dyn NeighborSource,
        out: &mut Vec<usize>,
    ) {
        neighbors.candidates(cfg, p, bias.range(), out);
        out.retain(|&q| bias.is_associated(cfg, p, q));
        out.sort_unstable();
    }

    /// Associated-particle count after replacing `p`'s partners by `new_partners`,
    /// computed from committed state without mutating it.
    pub fn preview_associated_count(&self, p: usize, new_partners: &[usize]) -> usize {
        let old = &self.partners[p];
        let mut count = self.associated.len();
        if !old.is_empty() {
            count -= 1;
        }
        if !new_partners.is_empty() {
            count += 1;
        }
        for q in old.iter().filter(|q| !new_partners.contains(q)) {
            if self.partners[*q].len() == 1 {
                count -= 1;
            }
        }
        for q in new_partners.iter().filter(|q| !old.contains(q)) {
            if self.partners[*q].is_empty() {
                count += 1;
            }
        }
        count
    }

    /// Whether giving `p` the partners `new_partners` keeps every degree within bound.
    pub fn preview_degrees_ok(&self, p: usize, new_partners: &[usize]) -> bool {
        if new_partners.len() > self.max_degree {
            return false;
        }
        let old = &self.partners[p];
        new_partners
            .iter()
            .filter(|q| !old.contains(q))
            .all(|&q| self.partners[q].len() < self.max_degree)
    }

    /// Size of the cluster `p` would join after replacing its partners by `new_partners`.
    ///
    /// Walks the committed graph from each new partner with `p` removed, so bonds `p`
    /// gives up no longer count.
    pub fn preview_cluster_size(&self, p: usize, new_partners: &[usize]) -> usize {
        let mut seen = vec![p];
        let mut stack = Vec::new();
        for &root in new_partners {
            if seen.contains(&root) {
                continue;
            }
            seen.push(root);
            stack.push(root);
            while let Some(cur) = stack.pop() {
                for &q in &self.partners[cur] {
                    if !seen.contains(&q) {
                        seen.push(q);
                        stack.push(q);
                    }
                }
            }
        }
        seen.len()
    }

    /// Full consistency check: symmetry, no self edges, degree bound, membership list.
    pub fn validate(&self) -> Result<()> {
        for (p, list) in self.partners.iter().enumerate() {
            for &q in list {
                if q == p {
                    return Err(Error::InvariantViolation(format!("self association at {p}")));
                }
                if !self.partners[q].contains(&p) {
                    return Err(Error::InvariantViolation(format!(
                        "association {p}->{q} has no reverse edge"
                    )));
                }
            }
            let listed = self.slot[p].is_some_and(|s| self.associated.get(s) == Some(&p));
            if listed != !list.is_empty() {
                return Err(Error::InvariantViolation(format!(
                    "membership list out of sync for particle {p}"
                )));
            }
        }
        if self.max_degree == 1 && self.associated.len() % 2 == 1 {
            return Err(Error::InvariantViolation(format!(
                "odd associated count ({}) under a dimer policy",
                self.associated.len()
            )));
        }
        self.check_degrees()
    }

    fn link(&mut self, a: usize, b: usize) {
        self.partners[a].push(b);
        self.partners[b].push(a);
        self.enlist(a);
        self.enlist(b);
    }

    fn unlink(&mut self, a: usize, b: usize) {
        self.partners[a].retain(|&q| q != b);
        self.partners[b].retain(|&q| q != a);
        if self.partners[a].is_empty() {
            self.delist(a);
        }
        if self.partners[b].is_empty() {
            self.delist(b);
        }
    }

    fn enlist(&mut self, p: usize) {
        if self.slot[p].is_none() {
            self.slot[p] = Some(self.associated.len());
            self.associated.push(p);
        }
    }

    /// Swap-remove from the membership list in O(1).
    fn delist(&mut self, p: usize) {
        let Some(s) = self.slot[p].take() else {
            return;
        };
        self.associated.swap_remove(s);
        if let Some(&moved) = self.associated.get(s) {
            self.slot[moved] = Some(s);
        }
    }

    fn check_size(&self, cfg: &Configuration) -> Result<()> {
        if cfg.len() != self.len() {
            return Err(Error::InvalidParam(format!(
                "graph sized for {} particles, configuration has {}",
                self.len(),
                cfg.len()
            )));
        }
        Ok(())
    }

    fn check_degrees(&self) -> Result<()> {
        for p in 0..self.len() {
            self.check_degree(p)?;
        }
        Ok(())
    }

    fn check_degree_around(&self, p: usize) -> Result<()> {
        self.check_degree(p)?;
        for &q in &self.partners[p] {
            self.check_degree(q)?;
        }
        Ok(())
    }

    fn check_degree(&self, p: usize) -> Result<()> {
        let d = self.partners[p].len();
        if d > self.max_degree {
            return Err(Error::InvariantViolation(format!(
                "particle {p} has {d} partners, max is {}",
                self.max_degree
            )));
        }
        Ok(())
    }
}
