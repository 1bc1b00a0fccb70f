use crate::error::{Error, Result};

/// Bonding relation of a pair as seen by the collision kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairBonding {
    /// Neither particle holds a bond.
    Free,
    /// The two particles are bonded to each other.
    Mutual,
    /// At least one particle is bonded to a third particle.
    Saturated,
}

/// Degree-1 partner map over dense particle indices.
///
/// `partner(partner(a)) == a` whenever `partner(a)` is defined, and nobody pairs with
/// itself. Mutators keep both slots in step or fail without touching either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondTable {
    partner: Vec<Option<u32>>,
    bonded: usize,
}

impl BondTable {
    pub fn new(n: usize) -> Self {
        Self {
            partner: vec![None; n],
            bonded: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.partner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.partner.is_empty()
    }

    #[inline]
    pub fn partner(&self, i: usize) -> Option<usize> {
        self.partner.get(i).copied().flatten().map(|p| p as usize)
    }

    #[inline]
    pub fn is_bonded(&self, i: usize) -> bool {
        self.partner(i).is_some()
    }

    /// Number of particles currently holding a bond (always even).
    #[inline]
    pub fn bonded_count(&self) -> usize {
        self.bonded
    }

    #[inline]
    pub fn num_bonds(&self) -> usize {
        self.bonded / 2
    }

    /// Classify the pair `(i, j)`, failing on a one-sided bond.
    pub fn pair_state(&self, i: usize, j: usize) -> Result<PairBonding> {
        let (pi, pj) = (self.partner(i), self.partner(j));
        match (pi == Some(j), pj == Some(i)) {
            (true, true) => Ok(PairBonding::Mutual),
            (false, false) => {
                if pi.is_some() || pj.is_some() {
                    Ok(PairBonding::Saturated)
                } else {
                    Ok(PairBonding::Free)
                }
            }
            _ => Err(Error::InvariantViolation(format!(
                "one-sided bond between {i} and {j}: partner({i})={pi:?}, partner({j})={pj:?}"
            ))),
        }
    }

    /// Record a bond between two free particles.
    pub fn form(&mut self, i: usize, j: usize) -> Result<()> {
        self.check_index(i)?;
        self.check_index(j)?;
        if i == j {
            return Err(Error::InvariantViolation(format!(
                "particle {i} cannot bond to itself"
            )));
        }
        if let Some(p) = self.partner(i) {
            return Err(Error::InvariantViolation(format!(
                "particle {i} already bonded to {p}"
            )));
        }
        if let Some(p) = self.partner(j) {
            return Err(Error::InvariantViolation(format!(
                "particle {j} already bonded to {p}"
            )));
        }
        self.partner[i] = Some(j as u32);
        self.partner[j] = Some(i as u32);
        self.bonded += 2;
        Ok(())
    }

    /// Remove the bond between `i` and `j`; both slots must point at each other.
    pub fn break_bond(&mut self, i: usize, j: usize) -> Result<()> {
        if self.pair_state(i, j)? != PairBonding::Mutual {
            return Err(Error::InvariantViolation(format!(
                "cannot break bond {i}-{j}: pair is not bonded"
            )));
        }
        self.partner[i] = None;
        self.partner[j] = None;
        self.bonded -= 2;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.partner.iter_mut().for_each(|p| *p = None);
        self.bonded = 0;
    }

    /// Bonded pairs `(i, j)` with `i < j`.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.partner
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|j| (i, j as usize)))
            .filter(|&(i, j)| i < j)
    }

    /// Populate from scratch: scan all pairs in index order and bond each free pair for
    /// which `within_well(i, j)` holds. Deterministic for a given predicate.
    pub fn initialize<F>(&mut self, mut within_well: F) -> Result<()>
    where
        F: FnMut(usize, usize) -> bool,
    {
        self.clear();
        let n = self.len();
        for i in 0..n {
            if self.is_bonded(i) {
                continue;
            }
            for j in (i + 1)..n {
                if !self.is_bonded(j) && within_well(i, j) {
                    self.form(i, j)?;
                    break;
                }
            }
        }
        self.validate()
    }

    /// Full consistency check: symmetry, no self-pairing, even associated count.
    pub fn validate(&self) -> Result<()> {
        let mut count = 0usize;
        for (i, p) in self.partner.iter().enumerate() {
            let Some(j) = p.map(|j| j as usize) else {
                continue;
            };
            count += 1;
            if j == i {
                return Err(Error::InvariantViolation(format!(
                    "particle {i} is paired with itself"
                )));
            }
            if self.partner(j) != Some(i) {
                return Err(Error::InvariantViolation(format!(
                    "partner({i})={j} but partner({j})={:?}",
                    self.partner(j)
                )));
            }
        }
        if count % 2 == 1 {
            return Err(Error::InvariantViolation(format!(
                "odd number of bonded particles ({count}) under a dimer policy"
            )));
        }
        if count != self.bonded {
            return Err(Error::InvariantViolation(format!(
                "bonded counter {} disagrees with table ({count})",
                self.bonded
            )));
        }
        Ok(())
    }

    fn check_index(&self, i: usize) -> Result<()> {
        if i >= self.len() {
            return Err(Error::InvalidParam(format!(
                "particle index {i} out of range (n = {})",
                self.len()
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn corrupt_one_side(&mut self, i: usize, j: usize) {
        self.partner[i] = Some(j as u32);
    }
}
