use crate::bonding::square_well::Shell;
use crate::error::{Error, Result};
use ordered_float::NotNan;
use std::cmp::Ordering;

/// Kinds of events scheduled by the event-driven engine.
///
/// Tie-breaking for deterministic ordering prefers `Pair` < `Wall` when times are equal,
/// and core hits before well hits within a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Square-well crossing between particles `i` and `j` on `shell`.
    Pair { i: u32, j: u32, shell: Shell },
    /// Particle `i` reaching wall `wall_id`.
    Wall { i: u32, wall_id: u32 },
}

impl EventKind {
    #[inline]
    fn order_key(&self) -> (u8, u32, u32, u8) {
        match *self {
            EventKind::Pair { i, j, shell } => (0, i, j, shell as u8),
            EventKind::Wall { i, wall_id } => (1, i, wall_id, 0),
        }
    }
}

/// A scheduled event in the priority queue with deterministic ordering.
///
/// - `time`: event occurrence time (finite, non-NaN).
/// - `kind`: event kind and participants.
/// - `cc_i`, `cc_j`: collision-count snapshots for invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: NotNan<f64>,
    pub kind: EventKind,
    pub cc_i: u64,
    pub cc_j: Option<u64>,
}

impl Event {
    /// Create a new event, validating that time is finite and non-NaN.
    pub fn new(time: f64, kind: EventKind, cc_i: u64, cc_j: Option<u64>) -> Result<Self> {
        if !time.is_finite() {
            return Err(Error::InvalidParam("event time must be finite".into()));
        }
        let time = NotNan::new(time)
            .map_err(|_| Error::InvalidParam("event time cannot be NaN".into()))?;
        Ok(Self {
            time,
            kind,
            cc_i,
            cc_j,
        })
    }

    /// Returns the raw f64 event time.
    #[inline]
    pub fn time_f64(&self) -> f64 {
        self.time.into_inner()
    }

    /// Validate against current collision counts. Wall events pass `None` for `cc_j_now`.
    #[inline]
    pub fn is_valid(&self, cc_i_now: u64, cc_j_now: Option<u64>) -> bool {
        if self.cc_i != cc_i_now {
            return false;
        }
        match (self.cc_j, cc_j_now) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            (None, Some(_)) => true,
            (Some(_), None) => false,
        }
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {
                let a = self.kind.order_key();
                let b = other.kind.order_key();
                match a.cmp(&b) {
                    Ordering::Equal => (self.cc_i, self.cc_j.unwrap_or(0))
                        .cmp(&(other.cc_i, other.cc_j.unwrap_or(0))),
                    o => o,
                }
            }
            o => o,
        }
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
