//! Neighbor iteration service consumed by the association graph.

use crate::core::configuration::Configuration;
use crate::core::vec3::norm_sq;

/// Yields candidate partners of a particle within a cutoff.
///
/// Implementations may return a superset of the particles within `cutoff`; callers
/// always apply the exact association predicate afterwards. The particle itself is
/// never a candidate.
pub trait NeighborSource {
    fn candidates(&self, cfg: &Configuration, i: usize, cutoff: f64, out: &mut Vec<usize>);
}

/// Brute-force nearest-image scan over every other particle.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllPairs;

impl NeighborSource for AllPairs {
    fn candidates(&self, cfg: &Configuration, i: usize, cutoff: f64, out: &mut Vec<usize>) {
        out.clear();
        let cut_sq = cutoff * cutoff;
        for j in 0..cfg.len() {
            if j == i {
                continue;
            }
            if norm_sq(&cfg.displacement(i, j)) <= cut_sq {
                out.push(j);
            }
        }
    }
}
