//! Chain ("smer") analysis of an association graph.
//!
//! A smer is a connected component. With `max_degree <= 2` every component is either a
//! linear chain or a ring; `chains` walks each one end to end so consumers see the
//! particles in bonded order.

use crate::association::graph::AssociationGraph;
use crate::error::{Error, Result};

/// One connected component in walk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smer {
    pub members: Vec<usize>,
    /// True when the last member is bonded back to the first.
    pub ring: bool,
}

impl Smer {
    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Decompose the graph into chains, monomers included.
///
/// Errors with `InvariantViolation` if any particle has more than two partners, since
/// a branched cluster has no chain order.
pub fn chains(graph: &AssociationGraph) -> Result<Vec<Smer>> {
    let n = graph.len();
    let mut seen = vec![false; n];
    let mut out = Vec::new();
    if let Some(p) = (0..n).find(|&p| graph.degree(p) > 2) {
        return Err(Error::InvariantViolation(format!(
            "particle {p} has {} partners; smers must be unbranched",
            graph.degree(p)
        )));
    }

    // Start from chain ends (degree <= 1) first so linear chains are walked end to end.
    let starts = (0..n)
        .filter(|&p| graph.degree(p) <= 1)
        .chain((0..n).filter(|&p| graph.degree(p) == 2));
    for start in starts {
        if seen[start] {
            continue;
        }
        let mut members = vec![start];
        seen[start] = true;
        let mut prev = None;
        let mut cur = start;
        let mut ring = false;
        loop {
            let next = graph
                .associated_with(cur)
                .iter()
                .copied()
                .find(|&q| Some(q) != prev && q != cur);
            let Some(next) = next else {
                break;
            };
            if next == start {
                ring = true;
                break;
            }
            if seen[next] {
                return Err(Error::InvariantViolation(format!(
                    "chain walk from {start} revisited {next}; partner lists are not symmetric"
                )));
            }
            seen[next] = true;
            members.push(next);
            prev = Some(cur);
            cur = next;
        }
        out.push(Smer { members, ring });
    }
    Ok(out)
}

/// Members of the component containing `p`, breadth first from `p`.
///
/// Every member after the first has a partner earlier in the list.
pub fn cluster_of(graph: &AssociationGraph, p: usize) -> Vec<usize> {
    let mut members = vec![p];
    let mut head = 0;
    while head < members.len() {
        let cur = members[head];
        head += 1;
        for &q in graph.associated_with(cur) {
            if !members.contains(&q) {
                members.push(q);
            }
        }
    }
    members
}

/// Connected-component sizes for any degree; `hist[k]` counts components of size `k`.
pub fn size_histogram(graph: &AssociationGraph) -> Vec<usize> {
    let n = graph.len();
    let mut seen = vec![false; n];
    let mut hist = vec![0usize; n + 1];
    let mut stack = Vec::new();
    for root in 0..n {
        if seen[root] {
            continue;
        }
        seen[root] = true;
        stack.push(root);
        let mut size = 0usize;
        while let Some(p) = stack.pop() {
            size += 1;
            for &q in graph.associated_with(p) {
                if !seen[q] {
                    seen[q] = true;
                    stack.push(q);
                }
            }
        }
        hist[size] += 1;
    }
    while hist.len() > 1 && hist.last() == Some(&0) {
        hist.pop();
    }
    hist
}
